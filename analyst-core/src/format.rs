//! Text renderings of result tables: CSV for prompts, markdown for display

use analyst::Table;
use anyhow::Result;

pub fn to_csv(table: &Table) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(table.columns.iter().map(|c| c.name.as_str()))?;
    for row in &table.rows {
        writer.write_record(row.iter().map(|cell| cell.to_string()))?;
    }
    let bytes = writer.into_inner().map_err(|e| anyhow::anyhow!("{}", e))?;
    Ok(String::from_utf8(bytes)?)
}

fn escape_markdown_cell(value: &str) -> String {
    value.replace('|', "\\|").replace('\n', " ")
}

/// Pipe table with a header row; numeric columns are right-aligned
pub fn to_markdown(table: &Table) -> String {
    if table.columns.is_empty() {
        return String::new();
    }

    let header: Vec<String> = table
        .columns
        .iter()
        .map(|c| escape_markdown_cell(&c.name))
        .collect();
    let align: Vec<&str> = table
        .columns
        .iter()
        .map(|c| match c.kind {
            analyst::ColumnKind::Numeric => "---:",
            _ => "---",
        })
        .collect();

    let mut lines = vec![
        format!("| {} |", header.join(" | ")),
        format!("|{}|", align.join("|")),
    ];
    for row in &table.rows {
        let cells: Vec<String> = row
            .iter()
            .map(|cell| escape_markdown_cell(&cell.to_string()))
            .collect();
        lines.push(format!("| {} |", cells.join(" | ")));
    }
    lines.join("\n")
}
