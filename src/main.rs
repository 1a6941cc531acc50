#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]

fn main() {
    if let Err(e) = couple_reminders::run() {
        eprintln!("couple-reminders: {e}");
        std::process::exit(1);
    }
}
