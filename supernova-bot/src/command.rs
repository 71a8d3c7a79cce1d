//! Parsing of chat text into bot commands.

use supernova_core::{FetchError, ForecastQuery};
use thiserror::Error;

/// Which command a message addresses, judged from its first token alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Help,
    GetId,
    Weather,
    Chat,
    Allow,
    Unknown,
}

impl CommandKind {
    pub fn of(text: &str) -> Self {
        let Some(head) = text.split_whitespace().next() else {
            return CommandKind::Unknown;
        };
        // Group chats address bots as `/weather@some_bot`.
        let name = head.split('@').next().unwrap_or(head);

        match name {
            "/help" => CommandKind::Help,
            "/getid" => CommandKind::GetId,
            "/weather" => CommandKind::Weather,
            "/chat" => CommandKind::Chat,
            "/allow" => CommandKind::Allow,
            _ => CommandKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    GetId,
    Weather(ForecastQuery),
    Chat(String),
    Allow(i64),
    Unknown,
}

/// Problems with what the user typed. The display text is sent back verbatim.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(
        "Please provide a city and forecast type (days or hours). Example: /weather london 5 days"
    )]
    WeatherUsage,

    #[error("Invalid number of days. Please provide a valid number from 1 to 5 (more is truncated)")]
    InvalidDays,

    #[error(
        "Invalid number of hours. Please provide a valid number from 1 to 12 (more is truncated)"
    )]
    InvalidHours,

    #[error("Please specify either 'days' or 'hours'. Example: /weather london 3 days")]
    MissingPeriod,

    #[error("Please provide a message after /chat command.")]
    EmptyPrompt,

    #[error("Usage: /allow <user_id>")]
    AllowUsage,

    #[error("Invalid user ID. Please provide a valid numeric ID")]
    InvalidUserId,

    #[error("{}", .0.user_message())]
    Query(#[from] FetchError),
}

/// Parse a chat message into a [`Command`].
pub fn parse(text: &str) -> Result<Command, CommandError> {
    let text = text.trim();
    let mut parts = text.split_whitespace();
    let _ = parts.next();
    let args: Vec<&str> = parts.collect();

    match CommandKind::of(text) {
        CommandKind::Help => Ok(Command::Help),
        CommandKind::GetId => Ok(Command::GetId),
        CommandKind::Weather => parse_weather(&args),
        CommandKind::Chat => parse_chat(text),
        CommandKind::Allow => parse_allow(&args),
        CommandKind::Unknown => Ok(Command::Unknown),
    }
}

// `/weather <city...> <N> days|hours`; the city may span several words.
fn parse_weather(args: &[&str]) -> Result<Command, CommandError> {
    if args.len() < 3 {
        return Err(CommandError::WeatherUsage);
    }

    let (city, rest) = args.split_at(args.len() - 2);
    let city = city.join(" ");
    let (count, period) = (rest[0], rest[1].to_lowercase());

    let query = if period.contains("day") {
        let days = parse_count(count).ok_or(CommandError::InvalidDays)?;
        ForecastQuery::days(city, days)?
    } else if period.contains("hour") {
        let hours = parse_count(count).ok_or(CommandError::InvalidHours)?;
        ForecastQuery::hours(city, hours)?
    } else {
        return Err(CommandError::MissingPeriod);
    };

    Ok(Command::Weather(query))
}

fn parse_count(raw: &str) -> Option<u32> {
    raw.parse::<u32>().ok().filter(|n| *n >= 1)
}

fn parse_chat(text: &str) -> Result<Command, CommandError> {
    let prompt = text
        .split_once(char::is_whitespace)
        .map(|(_, rest)| rest.trim())
        .unwrap_or_default();

    if prompt.is_empty() {
        return Err(CommandError::EmptyPrompt);
    }

    Ok(Command::Chat(prompt.to_string()))
}

fn parse_allow(args: &[&str]) -> Result<Command, CommandError> {
    let [raw] = args else {
        return Err(CommandError::AllowUsage);
    };

    raw.parse::<i64>().map(Command::Allow).map_err(|_| CommandError::InvalidUserId)
}
