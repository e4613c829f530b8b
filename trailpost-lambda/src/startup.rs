//! Cold-start failure reporting.
//!
//! When the full configuration cannot be loaded, the function still tries
//! to tell the default Slack destination before aborting. Only the three
//! Slack variables are read for that, so a broken route table or rule list
//! does not also prevent the report.

use trailpost_core::SlackTarget;
use trailpost_core::config::{
    ENV_DEFAULT_SLACK_CHANNEL_ID, ENV_HOOK_URL, ENV_SLACK_BOT_TOKEN, TrailpostConfig,
};
use trailpost_core::error::DeliveryError;
use trailpost_notifier::message::Notification;
use trailpost_notifier::slack::SlackTransport;

/// Slack target built from the default destination variables alone, or
/// `None` when they do not describe one.
pub fn fallback_slack_target<F>(lookup: F) -> Option<SlackTarget>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = TrailpostConfig::default();
    config.slack.hook_url = lookup(ENV_HOOK_URL).unwrap_or_default();
    config.slack.bot_token = lookup(ENV_SLACK_BOT_TOKEN).unwrap_or_default();
    config.slack.default_channel_id = lookup(ENV_DEFAULT_SLACK_CHANNEL_ID).unwrap_or_default();
    config.slack_target().ok()
}

/// Posts a "failed to process" notice describing `error` to the default
/// destination of `target`.
pub async fn report_startup_failure<S: SlackTransport>(
    slack: &S,
    target: &SlackTarget,
    error: &str,
) -> Result<(), DeliveryError> {
    let notification = Notification::failed_to_process(error, &[]);
    let destination = target.routes().default_destination();
    match target {
        SlackTarget::App { .. } => slack
            .post_message(destination, &notification, None)
            .await
            .map(|_| ()),
        SlackTarget::Webhook { .. } => {
            let status = slack.post_webhook(destination, &notification).await?;
            if (200..300).contains(&status) {
                Ok(())
            } else {
                Err(DeliveryError::Status {
                    channel: trailpost_notifier::slack::CHANNEL.to_owned(),
                    status,
                })
            }
        }
    }
}
