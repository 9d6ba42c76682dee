mod session;

use std::env;
use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use session::{Session, TranscriptProfile};

const USAGE: &str = "Usage: loadshed-emulator [--profile <session|under-frequency|roc|maintenance>] \
[--no-replay]";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Options {
    profile: TranscriptProfile,
    /// Play the profile's scripted episode before reading stdin.
    replay: bool,
}

fn main() -> ExitCode {
    let options = match parse_options(env::args().skip(1)) {
        Ok(options) => options,
        Err(err) => {
            eprintln!("{err}");
            eprintln!("{USAGE}");
            return ExitCode::from(2);
        }
    };

    match run(options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("emulator: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(options: Options) -> io::Result<()> {
    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut session = Session::recording(options.profile)?;

    writeln!(writer, "{}", options.profile.header())?;
    writeln!(writer, "transcript: {}", options.profile.log_path())?;

    if options.replay {
        for line in options.profile.script() {
            writeln!(writer, "{}{line}", prompt(&session))?;
            exchange(&mut session, line, &mut writer)?;
        }
    }

    writeln!(writer, "Type `help` for commands or `exit` to quit.")?;

    let mut line = String::new();
    loop {
        line.clear();
        write!(writer, "{}", prompt(&session))?;
        writer.flush()?;

        if reader.read_line(&mut line)? == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if is_exit(trimmed) {
            writeln!(writer, "Session closed at {}.", clock(&session))?;
            break;
        }

        exchange(&mut session, trimmed, &mut writer)?;
    }

    Ok(())
}

fn exchange(session: &mut Session, line: &str, writer: &mut impl Write) -> io::Result<()> {
    for response in session.handle_command(line)? {
        writeln!(writer, "{response}")?;
    }
    Ok(())
}

fn clock(session: &Session) -> String {
    format!("+{}ms", session.now().since_start().as_millis())
}

fn prompt(session: &Session) -> String {
    format!("[{}]> ", clock(session))
}

fn is_exit(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn parse_options<I>(args: I) -> Result<Options, String>
where
    I: IntoIterator<Item = String>,
{
    let mut options = Options {
        profile: TranscriptProfile::Session,
        replay: true,
    };
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        if arg == "--no-replay" {
            options.replay = false;
        } else if arg == "--profile" {
            let tag = args
                .next()
                .ok_or_else(|| "Expected value after --profile".to_string())?;
            options.profile = TranscriptProfile::from_tag(&tag)?;
        } else if let Some(tag) = arg.strip_prefix("--profile=") {
            options.profile = TranscriptProfile::from_tag(tag)?;
        } else if arg.starts_with('-') {
            return Err(format!("Unknown option `{arg}`"));
        } else {
            options.profile = TranscriptProfile::from_tag(&arg)?;
        }
    }

    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Options, String> {
        parse_options(args.iter().map(ToString::to_string))
    }

    #[test]
    fn defaults_to_plain_session() {
        let options = parse(&[]).unwrap();
        assert_eq!(options.profile, TranscriptProfile::Session);
        assert!(options.replay);
    }

    #[test]
    fn accepts_every_profile_spelling() {
        assert_eq!(
            parse(&["--profile", "roc"]).unwrap().profile,
            TranscriptProfile::RateOfChange
        );
        assert_eq!(
            parse(&["--profile=maintenance"]).unwrap().profile,
            TranscriptProfile::Maintenance
        );
        assert_eq!(
            parse(&["under-frequency", "--no-replay"]).unwrap(),
            Options {
                profile: TranscriptProfile::UnderFrequency,
                replay: false,
            }
        );
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse(&["--profile"]).is_err());
        assert!(parse(&["--profile", "reboot"]).is_err());
        assert!(parse(&["--verbose"]).is_err());
    }

    #[test]
    fn prompt_shows_the_session_clock() {
        let mut session = Session::new();
        assert_eq!(prompt(&session), "[+0ms]> ");
        session.handle_command("advance 250ms").unwrap();
        assert_eq!(prompt(&session), "[+250ms]> ");
    }
}
