use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// User actions the pipeline applies between ticks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    SelectImage(PathBuf),
    SelectVideo(PathBuf),
    SetBlur(bool),
    ToggleBlur,
    SaveSnapshot,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseCommandError {
    #[error("empty command")]
    Empty,
    #[error("`{0}` needs a path")]
    MissingPath(&'static str),
    #[error("blur takes `on` or `off`, got `{0}`")]
    BadBlurArgument(String),
    #[error("unknown command `{0}` (try: image <path>, video <path>, blur [on|off], snapshot, quit)")]
    Unknown(String),
}

/// Parses one line of the text front end:
/// `image <path>`, `video <path>`, `blur [on|off]`, `snapshot`, `quit`.
impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        match word.to_ascii_lowercase().as_str() {
            "" => Err(ParseCommandError::Empty),
            "image" | "img" => path_arg(rest, "image").map(Command::SelectImage),
            "video" | "vid" => path_arg(rest, "video").map(Command::SelectVideo),
            "blur" => match rest.to_ascii_lowercase().as_str() {
                "" | "toggle" => Ok(Command::ToggleBlur),
                "on" | "true" | "1" => Ok(Command::SetBlur(true)),
                "off" | "false" | "0" => Ok(Command::SetBlur(false)),
                other => Err(ParseCommandError::BadBlurArgument(other.to_string())),
            },
            "snapshot" | "snap" | "s" => Ok(Command::SaveSnapshot),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            other => Err(ParseCommandError::Unknown(other.to_string())),
        }
    }
}

fn path_arg(rest: &str, command: &'static str) -> Result<PathBuf, ParseCommandError> {
    if rest.is_empty() {
        Err(ParseCommandError::MissingPath(command))
    } else {
        Ok(PathBuf::from(rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("image bg.png", Command::SelectImage("bg.png".into()))]
    #[case("  video /tmp/my clip.gif ", Command::SelectVideo("/tmp/my clip.gif".into()))]
    #[case("blur", Command::ToggleBlur)]
    #[case("blur on", Command::SetBlur(true))]
    #[case("BLUR off", Command::SetBlur(false))]
    #[case("snapshot", Command::SaveSnapshot)]
    #[case("q", Command::Quit)]
    fn test_parse(#[case] line: &str, #[case] expected: Command) {
        assert_eq!(line.parse::<Command>().unwrap(), expected);
    }

    #[rstest]
    #[case("", ParseCommandError::Empty)]
    #[case("image", ParseCommandError::MissingPath("image"))]
    #[case("blur maybe", ParseCommandError::BadBlurArgument("maybe".into()))]
    #[case("dance", ParseCommandError::Unknown("dance".into()))]
    fn test_parse_errors(#[case] line: &str, #[case] expected: ParseCommandError) {
        assert_eq!(line.parse::<Command>().unwrap_err(), expected);
    }
}
