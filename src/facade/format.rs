//! Message texts and control layouts.
//!
//! Localization is the embedder's concern; these are the engine's plain
//! renderings of its announcements, plus the standard player/queue control
//! layouts the embedding bot turns into inline buttons.

use crate::model::{Checkpoint, Track};
use crate::platform::{Button, ControlAction, Controls};
use crate::player::PlaybackIssue;
use crate::presence::BlockedReason;
use crate::resolver::ResolveError;
use crate::transport::TransportError;

/// Slots in the textual progress bar.
const PROGRESS_SLOTS: usize = 10;

/// Format seconds as `M:SS`, or `H:MM:SS` past the hour.
pub fn format_duration(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let mins = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{hours}:{mins:02}:{secs:02}")
    } else {
        format!("{mins}:{secs:02}")
    }
}

/// A textual progress bar: `▰▰▰▱▱▱▱▱▱▱ 0:45 / 3:00`.
///
/// Live tracks (duration 0) render as `live` with the elapsed time.
pub fn progress_bar(position_seconds: u64, duration_seconds: u32) -> String {
    if duration_seconds == 0 {
        return format!("live · {}", format_duration(position_seconds));
    }

    let duration = u64::from(duration_seconds);
    let clamped = position_seconds.min(duration);
    let filled = ((clamped * PROGRESS_SLOTS as u64) / duration.max(1)) as usize;
    let filled = filled.min(PROGRESS_SLOTS);

    let mut bar = String::new();
    for _ in 0..filled {
        bar.push('▰');
    }
    for _ in filled..PROGRESS_SLOTS {
        bar.push('▱');
    }
    format!(
        "{bar} {} / {}",
        format_duration(clamped),
        format_duration(duration)
    )
}

/// The now-playing card body.
pub fn now_playing_text(track: &Track, position_seconds: u64) -> String {
    let mut text = format!("Now playing: {}\n", track.title);
    if let Some(uploader) = &track.uploader {
        text.push_str(&format!("By {uploader}\n"));
    }
    text.push_str(&format!("Requested by {}\n\n", track.requester_display));
    text.push_str(&progress_bar(position_seconds, track.duration));
    text
}

/// "Added to queue" confirmation.
pub fn added_to_queue_text(track: &Track, position: usize) -> String {
    format!(
        "Added to queue at position {position}: {} ({})\nRequested by {}",
        track.title,
        format_duration(u64::from(track.duration)),
        track.requester_display
    )
}

/// One page of the queue.
pub fn queue_view_text(
    now_playing: Option<&Track>,
    entries: &[Track],
    page: usize,
    total_pages: usize,
    page_size: usize,
) -> String {
    let mut text = String::new();
    match now_playing {
        Some(track) => text.push_str(&format!("Now playing: {}\n\n", track.title)),
        None => text.push_str("Nothing is playing.\n\n"),
    }

    if entries.is_empty() {
        text.push_str("The queue is empty.");
        return text;
    }

    let first_index = (page - 1) * page_size;
    for (offset, track) in entries.iter().enumerate() {
        text.push_str(&format!(
            "{}. {} ({}) by {}\n",
            first_index + offset + 1,
            track.title,
            format_duration(u64::from(track.duration)),
            track.requester_display
        ));
    }
    text.push_str(&format!("\nPage {page}/{total_pages}"));
    text
}

/// Announcement posted before re-joining a chat after a restart.
pub fn resume_announcement(checkpoint: &Checkpoint) -> String {
    format!(
        "Back after a restart, resuming {} from {}.",
        checkpoint.track.title,
        format_duration(checkpoint.position_seconds)
    )
}

/// User-facing description of a playback failure, with guidance where the
/// user can actually fix something.
pub fn describe_issue(issue: &PlaybackIssue) -> String {
    match issue {
        PlaybackIssue::Resolve(ResolveError::NotFound) => {
            "I could not find anything for that query.".to_string()
        }
        PlaybackIssue::Resolve(ResolveError::Forbidden(detail)) => {
            format!("The source refused to hand that track over ({detail}).")
        }
        PlaybackIssue::Resolve(ResolveError::Unavailable(_)) => {
            "The media extractor is unavailable right now, try again in a minute.".to_string()
        }
        PlaybackIssue::Transport(TransportError::NoActiveCall) => {
            "There is no active voice chat here. Start one and try again.".to_string()
        }
        PlaybackIssue::Transport(e) => format!("Voice chat trouble: {e}."),
        PlaybackIssue::Presence(e) => match e.reason() {
            BlockedReason::BotNotAdmin => {
                "I need admin rights (invite and promote members) to bring my assistant into the voice chat.".to_string()
            }
            BlockedReason::AssistantPrivacyRestricted => {
                "My assistant account's privacy settings block the invitation; add it to the chat manually.".to_string()
            }
            BlockedReason::CannotInvite => {
                "I could not create an invite link for my assistant; add it to the chat manually.".to_string()
            }
            BlockedReason::Platform => format!("The platform got in the way: {e}."),
        },
        PlaybackIssue::MissingLocalFile { path } => {
            format!("The uploaded audio is gone from disk ({path}), skipping it.")
        }
    }
}

/// Reply for a rate-limited play request.
pub fn rate_limited_text(retry_in: std::time::Duration) -> String {
    format!(
        "Easy there, wait {} s before requesting another track.",
        retry_in.as_secs().max(1)
    )
}

/// The player control rows under the now-playing card.
pub fn player_controls(paused: bool) -> Controls {
    let toggle = if paused {
        Button::new("Resume", ControlAction::Resume)
    } else {
        Button::new("Pause", ControlAction::Pause)
    };
    Controls {
        rows: vec![
            vec![
                toggle,
                Button::new("Skip", ControlAction::Skip),
                Button::new("Stop", ControlAction::Stop),
            ],
            vec![Button::new("Queue", ControlAction::QueuePage(1))],
        ],
    }
}

/// Pagination rows under a queue view.
pub fn queue_controls(page: usize, total_pages: usize) -> Controls {
    let mut nav = Vec::new();
    if page > 1 {
        nav.push(Button::new("◀", ControlAction::QueuePage(page - 1)));
    }
    nav.push(Button::new(
        format!("Page {page}/{total_pages}"),
        ControlAction::Noop,
    ));
    if page < total_pages {
        nav.push(Button::new("▶", ControlAction::QueuePage(page + 1)));
    }
    Controls {
        rows: vec![nav, vec![Button::new("Back to player", ControlAction::PlayerView)]],
    }
}
