//! Coloured, user-facing CLI messages.
//! Colours are used only when the target stream is a TTY; primary command output
//! (file contents, walk listings) goes through `print_user` so it stays scriptable.

use owo_colors::OwoColorize;

#[derive(Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

fn is_tty(stream: Stream) -> bool {
    match stream {
        Stream::Stdout => atty::is(atty::Stream::Stdout),
        Stream::Stderr => atty::is(atty::Stream::Stderr),
    }
}

fn emit(stream: Stream, label: &str, colored: String, msg: &str) {
    let line = if is_tty(stream) { format!("{colored} {msg}") } else { format!("{label} {msg}") };
    match stream {
        Stream::Stdout => println!("{line}"),
        Stream::Stderr => eprintln!("{line}"),
    }
}

pub fn print_info(msg: &str) {
    emit(Stream::Stderr, "info:", "info:".cyan().bold().to_string(), msg);
}

pub fn print_warn(msg: &str) {
    emit(Stream::Stderr, "warn:", "warn:".yellow().bold().to_string(), msg);
}

pub fn print_error(msg: &str) {
    emit(Stream::Stderr, "error:", "error:".red().bold().to_string(), msg);
}

pub fn print_success(msg: &str) {
    emit(Stream::Stderr, "ok:", "ok:".green().bold().to_string(), msg);
}

/// Plain line on stdout, no prefix.
pub fn print_user(msg: &str) {
    println!("{msg}");
}
