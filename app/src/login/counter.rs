use std::io;
use std::io::{stdout, Write};
use std::time::Duration;

use crossterm::{
    cursor, queue,
    style::Print,
    terminal::{self, ClearType},
};
use infrastructure::sync::timer;

const UNIT_SECOND: Duration = Duration::from_secs(1);

/// Shows the seconds left on the current line until it reaches zero.
pub async fn counter(seconds: u64) -> io::Result<()> {
    timer::countdown(seconds, UNIT_SECOND, render).await
}

fn render(count: u64) -> io::Result<()> {
    queue!(
        stdout(),
        cursor::SavePosition,
        cursor::Hide,
        terminal::Clear(ClearType::CurrentLine),
        Print(format!("Waiting for authorization: {count}s")),
        cursor::RestorePosition
    )?;
    io::stdout().flush()
}

pub fn recover_cursor() -> io::Result<()> {
    crossterm::execute!(
        stdout(),
        terminal::Clear(ClearType::CurrentLine),
        cursor::Show
    )
}
