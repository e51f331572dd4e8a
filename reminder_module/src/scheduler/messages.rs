//! Notification copy: greetings by time-of-day band, the rotating weekly
//! motivation list, trial warnings and reflection prompts.

use chrono::{NaiveDateTime, Timelike};

use super::ledger::WarningKind;

const MOTIVATION_MESSAGES: [&str; 5] = [
    "Another week of keeping your emotion diary. Remember: every step toward \
     understanding yourself is a real achievement!",
    "You are doing important work! Tracking your emotions is a skill that helps \
     you understand and manage how you feel.",
    "Change happens gradually. Every diary entry is an investment in your \
     mental wellbeing.",
    "Remember: there are no right or wrong emotions! Every feeling matters and \
     deserves attention. Keep observing yourself with kindness.",
    "You grow a little every day, and the diary helps you see that progress. \
     Keep it up!",
];

pub(crate) fn greeting_for_hour(hour: u32) -> (&'static str, &'static str) {
    match hour {
        6..=11 => ("Good morning", "How has your day started?"),
        12..=16 => ("Good afternoon", "How is the middle of your day going?"),
        17..=21 => ("Good evening", "How did your day go?"),
        _ => ("Hi", "How are you feeling right now?"),
    }
}

pub(crate) fn emotion_reminder_text(display_name: &str, local: NaiveDateTime) -> String {
    let (greeting, prompt) = greeting_for_hour(local.time().hour());
    format!(
        "{greeting}, {display_name}!\n\n\
         Time for your emotion diary. {prompt}\n\n\
         Open the Emotion Diary from the main menu to log how you feel.\n\n\
         Tracking your emotions regularly helps you understand yourself better."
    )
}

/// Weekly motivation, rotated deterministically by ISO week number so the
/// same week always picks the same entry.
pub(crate) fn weekly_motivation_text(display_name: &str, iso_week: u32) -> String {
    let body = MOTIVATION_MESSAGES[iso_week as usize % MOTIVATION_MESSAGES.len()];
    format!("Hi, {display_name}!\n\n{body}")
}

pub(crate) fn weekly_reflection_text(display_name: &str) -> String {
    format!(
        "Hi, {display_name}!\n\n\
         Sunday evening is a perfect moment for a weekly reflection.\n\n\
         Let's look back together at the good moments of this week and think \
         about what brought you joy and gratitude."
    )
}

pub(crate) fn trial_warning_text(kind: WarningKind) -> &'static str {
    match kind {
        WarningKind::ThreeDay => {
            "Your trial period ends in 3 days.\n\n\
             After it ends, access to the bot will be limited. To keep using \
             every feature without interruption, consider upgrading to a \
             subscription."
        }
        WarningKind::OneDay => {
            "Tomorrow is the last day of your trial period.\n\n\
             Don't lose your progress! Upgrade today to keep working with the \
             bot without a break."
        }
    }
}

pub(crate) fn session_reflection_text(display_name: &str, session_local: NaiveDateTime) -> String {
    format!(
        "Hi, {display_name}!\n\n\
         A few hours have passed since your session with your therapist \
         ({}). A good moment to reflect!\n\n\
         Open Reflection from the main menu to capture your impressions while \
         they are fresh.",
        session_local.format("%d.%m.%Y at %H:%M")
    )
}
