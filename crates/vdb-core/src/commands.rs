//! Chat command parsing and the static reply texts.

use crate::domain::Platform;

pub const UNKNOWN_COMMAND_TEXT: &str = "❌ Unknown command. Type /help to see available commands.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Info,
    /// `url` is the first argument, if any.
    Download {
        platform: Platform,
        url: Option<String>,
    },
    Unknown(String),
}

/// Split `/cmd@botname arg ...` into a lowercase command name and the rest.
fn split_command(text: &str) -> (String, String) {
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

/// Parse inbound text. Anything that is not a `/command` yields `None`.
pub fn parse_command(text: &str) -> Option<Command> {
    let text = text.trim_start();
    if !text.starts_with('/') {
        return None;
    }

    let (cmd, rest) = split_command(text);
    let command = match cmd.as_str() {
        "start" => Command::Start,
        "help" => Command::Help,
        "info" => Command::Info,
        other => match Platform::from_command(other) {
            Some(platform) => Command::Download {
                platform,
                url: rest.split_whitespace().next().map(str::to_string),
            },
            None => Command::Unknown(cmd),
        },
    };
    Some(command)
}

pub fn missing_url_text(platform: Platform) -> String {
    let article = match platform {
        Platform::Instagram => "an",
        _ => "a",
    };
    format!(
        "❌ Please provide {article} {} URL.\nExample: /{} {}",
        platform.display_name(),
        platform.command(),
        platform.example_url()
    )
}

pub fn queue_full_text(queued: usize) -> String {
    format!("⏳ You already have {queued} downloads queued. Please wait for them to finish.")
}

pub fn welcome_text() -> String {
    [
        "👋 Welcome to Social Media Video Downloader Bot!",
        "",
        "Available Commands:",
        "",
        "📥 Download Videos:",
        "/yt [link] - Download YouTube video",
        "/fb [link] - Download Facebook video",
        "/insta [link] - Download Instagram video",
        "",
        "ℹ️ Other Commands:",
        "/help - Show help menu",
        "/info - Show bot information",
        "",
        "How to Download:",
        "1. Send a command with video link (e.g., /yt https://youtube.com/watch?v=example)",
        "2. Bot will download and send the video directly to this chat",
        "3. For large videos, the bot will automatically compress them",
        "",
        "⚠️ Note: Make sure to send the video link immediately after the command.",
    ]
    .join("\n")
}

pub fn help_text() -> String {
    [
        "📚 Help Menu",
        "",
        "Download Commands:",
        "/yt [link] - Download YouTube video",
        "/fb [link] - Download Facebook video",
        "/insta [link] - Download Instagram video",
        "",
        "Other Commands:",
        "/start - Start the bot",
        "/help - Show this help message",
        "/info - Show bot information",
        "",
        "Note: Videos will be downloaded and sent directly to this chat. Large videos will be automatically compressed.",
        "",
        "Usage Example:",
        "/yt https://youtube.com/watch?v=example",
    ]
    .join("\n")
}

pub fn info_text(transport_name: &str) -> String {
    format!(
        "🤖 Bot Information\n\n\
         • Version: {}\n\
         • Platform: {transport_name}\n\
         • Features:\n  \
         - High-quality video downloads\n  \
         - Support for multiple platforms\n  \
         - Automatic video compression\n  \
         - Fast and reliable service\n\n\
         Note: This bot is for personal use only.",
        env!("CARGO_PKG_VERSION")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_download_commands() {
        assert_eq!(
            parse_command("/yt https://youtu.be/abc extra"),
            Some(Command::Download {
                platform: Platform::YouTube,
                url: Some("https://youtu.be/abc".to_string()),
            })
        );
        assert_eq!(
            parse_command("/INSTA@my_bot   https://instagram.com/p/x"),
            Some(Command::Download {
                platform: Platform::Instagram,
                url: Some("https://instagram.com/p/x".to_string()),
            })
        );
        assert_eq!(
            parse_command("/fb"),
            Some(Command::Download {
                platform: Platform::Facebook,
                url: None,
            })
        );
    }

    #[test]
    fn parses_static_and_unknown_commands() {
        assert_eq!(parse_command("/start"), Some(Command::Start));
        assert_eq!(parse_command("/Help"), Some(Command::Help));
        assert_eq!(parse_command("/info@bot"), Some(Command::Info));
        assert_eq!(
            parse_command("/tiktok url"),
            Some(Command::Unknown("tiktok".to_string()))
        );
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command(""), None);
    }

    #[test]
    fn missing_url_text_shows_example() {
        assert_eq!(
            missing_url_text(Platform::YouTube),
            "❌ Please provide a YouTube URL.\nExample: /yt https://youtube.com/watch?v=example"
        );
        assert_eq!(
            missing_url_text(Platform::Instagram),
            "❌ Please provide an Instagram URL.\nExample: /insta https://instagram.com/p/example"
        );
    }

    #[test]
    fn info_mentions_version_and_transport() {
        let text = info_text("Telegram");
        assert!(text.contains(env!("CARGO_PKG_VERSION")));
        assert!(text.contains("Platform: Telegram"));
    }
}
