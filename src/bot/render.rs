//! Plain-text rendering of training events for Discord.
//!
//! Times are rendered as Discord timestamp markup (`<t:unix:R>`) so every
//! reader sees them in their own timezone.

use crate::{
    core::{
        engine::SessionView,
        notify::{RejectReason, TrainingEvent},
        review::ReviewSummary,
    },
    errors::Result,
};
use chrono::{DateTime, Duration, Utc};
use poise::serenity_prelude as serenity;
use std::fmt::Write;

/// Embed colour used when a character has none.
pub const DEFAULT_COLOR: u32 = 0x0058_65F2;

fn mention(user_id: &str) -> String {
    format!("<@{user_id}>")
}

fn relative(at: DateTime<Utc>) -> String {
    format!("<t:{}:R>", at.timestamp())
}

fn minutes(d: Duration) -> i64 {
    // Round up so "0 minutes" is never shown while time is left
    (d.num_seconds() + 59) / 60
}

/// Text block showing progress toward the hourly quota.
#[must_use]
pub fn progress_bar(percent: u8) -> String {
    let filled = usize::from(percent.min(100)) / 10;
    format!("{}{} {percent}%", "█".repeat(filled), "░".repeat(10 - filled))
}

fn reject_text(user_id: &str, reason: RejectReason) -> String {
    let who = mention(user_id);
    match reason {
        RejectReason::WindowExpired => {
            format!("⏰ {who}, this hour has already ended. The post was not counted.")
        }
        RejectReason::InCooldown { remaining } => format!(
            "⏳ {who}, this hour's quota is already met. The next hour starts in {} min.",
            minutes(remaining)
        ),
        RejectReason::TooShort { symbols, required } => format!(
            "✏️ {who}, that post has {symbols} symbols; at least {required} are needed for it to count."
        ),
        RejectReason::HourCapReached { remaining } => format!(
            "🚫 {who}, you have used every post for this hour. It ends in {} min.",
            minutes(remaining)
        ),
    }
}

/// Renders an event as a channel message.
#[must_use]
pub fn render_event(event: &TrainingEvent) -> String {
    match event {
        TrainingEvent::SessionStarted {
            session_id,
            user_id,
            character_name,
            total_hours,
            category,
            deadline,
        } => format!(
            "🏋️ {} started training **{character_name}** ({category}) for {total_hours} h \
             (session #{session_id}). Hour 1 ends {}.",
            mention(user_id),
            relative(*deadline)
        ),
        TrainingEvent::PostAccepted {
            user_id,
            hour,
            total_hours,
            posts,
            max_posts,
            symbols,
            quota,
            percent,
            ..
        } => format!(
            "✅ {} hour {hour}/{total_hours}: post {posts}/{max_posts}, {symbols}/{quota} symbols\n{}",
            mention(user_id),
            progress_bar(*percent)
        ),
        TrainingEvent::PostRejected { user_id, reason } => reject_text(user_id, *reason),
        TrainingEvent::HourCompleted {
            user_id,
            hour,
            total_hours,
            next_hour_at,
            ..
        } => format!(
            "🎯 {} completed hour {hour}/{total_hours}. Hour {} begins {}.",
            mention(user_id),
            hour + 1,
            relative(*next_hour_at)
        ),
        TrainingEvent::HourStarted {
            user_id,
            hour,
            total_hours,
            deadline,
            ..
        } => format!(
            "▶️ {} hour {hour}/{total_hours} has begun and ends {}.",
            mention(user_id),
            relative(*deadline)
        ),
        TrainingEvent::SessionCompleted {
            session_id,
            user_id,
            total_posts,
            total_symbols,
        } => format!(
            "🏁 {} finished session #{session_id}: {total_posts} posts, {total_symbols} symbols. \
             It has been sent for review.",
            mention(user_id)
        ),
        TrainingEvent::SessionFailed {
            session_id,
            user_id,
            hour,
            reason,
        } => format!(
            "❌ {} session #{session_id} failed in hour {hour}: {}.",
            mention(user_id),
            reason.as_str()
        ),
        TrainingEvent::SessionApproved {
            session_id,
            user_id,
            reviewer_id,
        } => format!(
            "🎉 {} session #{session_id} was approved by {}.",
            mention(user_id),
            mention(reviewer_id)
        ),
        TrainingEvent::SessionRejected {
            session_id,
            user_id,
            reviewer_id,
            reason,
        } => format!(
            "📝 {} session #{session_id} was rejected by {}: {reason}",
            mention(user_id),
            mention(reviewer_id)
        ),
    }
}

/// Builds the embed reviewers see for a completed session.
///
/// # Errors
/// Returns an error if formatting the hour breakdown fails.
pub fn review_embed(summary: &ReviewSummary) -> Result<serenity::CreateEmbed> {
    let color = summary
        .character_color
        .and_then(|c| u32::try_from(c).ok())
        .unwrap_or(DEFAULT_COLOR);

    let mut hours = String::new();
    for hour in &summary.hours {
        writeln!(
            hours,
            "Hour {}: {} posts, {} symbols",
            hour.hour, hour.posts, hour.symbols
        )?;
    }

    Ok(serenity::CreateEmbed::default()
        .title(format!("Training review: session #{}", summary.session_id))
        .color(color)
        .field("Trainee", mention(&summary.user_id), true)
        .field("Character", summary.character_name.clone(), true)
        .field("Category", summary.category.label(), true)
        .field("Hours", hours, false)
        .field(
            "Totals",
            format!(
                "{} posts, {} symbols",
                summary.total_posts, summary.total_symbols
            ),
            false,
        )
        .footer(serenity::CreateEmbedFooter::new(format!(
            "/training approve session_id:{0} or /training reject session_id:{0}",
            summary.session_id
        ))))
}

/// Renders a user's active session for `/training status`.
///
/// # Errors
/// Returns an error if formatting fails.
pub fn render_status(view: &SessionView, quota: i64) -> Result<String> {
    let session = &view.session;
    let mut text = format!(
        "**Session #{}** ({}), hour {}/{}",
        session.id, session.category, session.current_hour, session.total_hours
    );
    match (&view.entry, view.progress, view.deadline) {
        (Some(entry), _, Some(deadline)) if entry.in_cooldown => {
            write!(
                text,
                "\nQuota met. Hour {} begins {}.",
                session.current_hour,
                relative(deadline)
            )?;
        }
        (Some(entry), Some(progress), Some(deadline)) => {
            write!(
                text,
                "\n{} posts, {}/{quota} symbols\n{}\nHour ends {}.",
                entry.posts,
                entry.symbols,
                progress_bar(progress.percent),
                relative(deadline)
            )?;
        }
        _ => text.push_str("\nProgress is not being tracked right now."),
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::{ingest::InboundPost, notify::FailureReason};
    use crate::test_utils::{TEST_CHANNEL, TestHarness, test_now};

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(0), "░░░░░░░░░░ 0%");
        assert_eq!(progress_bar(34), "███░░░░░░░ 34%");
        assert_eq!(progress_bar(100), "██████████ 100%");
    }

    #[test]
    fn test_reject_rounds_minutes_up() {
        let text = render_event(&TrainingEvent::PostRejected {
            user_id: "42".to_string(),
            reason: RejectReason::HourCapReached {
                remaining: Duration::seconds(61),
            },
        });
        assert!(text.contains("<@42>"));
        assert!(text.contains("2 min"));
    }

    #[test]
    fn test_failure_mentions_reason() {
        let text = render_event(&TrainingEvent::SessionFailed {
            session_id: 3,
            user_id: "42".to_string(),
            hour: 2,
            reason: FailureReason::Timeout,
        });
        assert!(text.contains("session #3 failed in hour 2: quota not met in time"));
    }

    #[test]
    fn test_hour_completed_uses_discord_timestamp() {
        let next = test_now();
        let text = render_event(&TrainingEvent::HourCompleted {
            session_id: 1,
            user_id: "42".to_string(),
            hour: 1,
            total_hours: 3,
            next_hour_at: next,
        });
        assert!(text.contains(&format!("<t:{}:R>", next.timestamp())));
        assert!(text.contains("Hour 2 begins"));
    }

    #[tokio::test]
    async fn test_status_shows_progress_then_cooldown() -> Result<()> {
        let harness = TestHarness::new().await?;
        harness.start("user1", 2).await?;
        let post = |n: usize, symbols: usize| InboundPost {
            user_id: "user1".to_string(),
            channel_id: TEST_CHANNEL.to_string(),
            message_id: format!("m{n}"),
            content: "x".repeat(symbols),
        };

        harness.engine.handle_post(post(1, 800)).await?;
        let view = harness.engine.session_status("user1").await?.unwrap();
        let text = render_status(&view, 3200)?;
        assert!(text.contains("hour 1/2"));
        assert!(text.contains("1 posts, 800/3200 symbols"));

        harness.engine.handle_post(post(2, 2400)).await?;
        let view = harness.engine.session_status("user1").await?.unwrap();
        let text = render_status(&view, 3200)?;
        let boundary = test_now() + Duration::minutes(60);
        assert!(text.contains(&format!("Hour 2 begins <t:{}:R>", boundary.timestamp())));
        Ok(())
    }
}
