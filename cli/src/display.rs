//! Terminal rendering of engine output

use analyst::{Role, VerifiedQueryInfo, Warning};
use analyst_core::format::to_markdown;
use analyst_core::{FeedbackOutcome, FeedbackView, Insight, Notification, RenderItem, RenderedMessage};

fn print_verified(verified: &VerifiedQueryInfo) {
    println!("  ✔ Verified Query Used");
    println!("    Name: {}", verified.name);
    println!("    Question: {}", verified.question);
    println!("    Verified by: {}", verified.verified_by);
    match verified.verified_at_utc() {
        Some(at) => println!("    Verified at: {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("    Verified at: {}", verified.verified_at),
    }
    println!("    SQL:");
    for line in verified.sql.lines() {
        println!("      {}", line);
    }
}

pub fn print_item(item: &RenderItem) {
    match item {
        RenderItem::Markdown(text) => println!("{}", text),
        RenderItem::Suggestions {
            first_option, options, ..
        } => {
            println!("Suggestions (pick with /suggest <n>):");
            for (i, option) in options.iter().enumerate() {
                println!("  {}. {}", first_option + i + 1, option);
            }
        }
        RenderItem::Sql { statement, verified } => {
            println!("```sql");
            println!("{}", statement);
            println!("```");
            if let Some(verified) = verified {
                print_verified(verified);
            }
        }
        RenderItem::Table(table) => {
            println!();
            println!("{}", to_markdown(table));
            println!();
        }
        RenderItem::Insight(Insight::Ai(text)) => println!("💡 AI Insight: {}", text),
        RenderItem::Insight(Insight::Fallback(text)) => {
            println!("💡 Insight:");
            println!("{}", text);
        }
        RenderItem::NoResults => println!("Query returned no data."),
        RenderItem::SqlError(message) => println!("Could not execute SQL query. Error: {}", message),
        RenderItem::Feedback { request_id, view } => match view {
            FeedbackView::Form => {
                println!("📝 Query feedback: /feedback {} <up|down> [message]", request_id)
            }
            FeedbackView::Submitted => println!("📝 Feedback submitted ✅"),
            FeedbackView::Failed(message) => println!("{}", message),
        },
        RenderItem::Unsupported(kind) => println!("[unsupported content type: {}]", kind),
    }
}

pub fn print_message(message: &RenderedMessage) {
    match (message.role, &message.request_id) {
        (Role::User, _) => println!("👤 You"),
        (Role::Analyst, Some(id)) => println!("🤖 Analyst  (request {})", id),
        (Role::Analyst, None) => println!("🤖 Analyst"),
    }
    for item in &message.items {
        print_item(item);
    }
    println!();
}

pub fn print_warning(warning: &Warning) {
    println!("⚠️  {}", warning.message);
}

pub fn print_notification(notification: &Notification) {
    match notification {
        Notification::ApiError => eprintln!("🚨 {}", notification.text()),
        Notification::LoggingFailed(_) => eprintln!("⚠️  {}", notification.text()),
    }
}

pub fn print_feedback_outcome(request_id: &str, outcome: &FeedbackOutcome) {
    match outcome {
        FeedbackOutcome::Submitted => println!("Feedback submitted ✅"),
        FeedbackOutcome::Failed(message) => println!("{}", message),
        FeedbackOutcome::AlreadySubmitted => {
            println!("Feedback for {} was already submitted.", request_id)
        }
    }
}
