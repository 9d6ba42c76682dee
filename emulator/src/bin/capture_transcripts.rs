use std::io;

#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use session::{Session, TranscriptProfile};

fn main() -> io::Result<()> {
    for profile in [
        TranscriptProfile::UnderFrequency,
        TranscriptProfile::RateOfChange,
        TranscriptProfile::Maintenance,
    ] {
        let mut session = Session::recording(profile)?;
        for line in profile.script() {
            session.handle_command(line)?;
        }
        println!("{} -> {}", profile.header(), profile.log_path());
    }
    Ok(())
}
