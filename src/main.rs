//! generate-pdf – reads an HTML document on stdin and writes a print-styled
//! PDF to stdout.
//!
//! Usage:
//!   generate-pdf < roteiro.html > roteiro.pdf
//!
//! Arguments are ignored. On failure nothing is written to stdout, a single
//! `Error generating PDF: ...` line goes to stderr and the exit status is 1.

use std::io::{self, Read, Write};
use std::process;

use printsheet::{Converter, Result};

fn run() -> Result<()> {
    let mut input = Vec::new();
    io::stdin().lock().read_to_end(&mut input)?;
    let html = String::from_utf8(input)?;

    let pdf = Converter::new().convert(&html)?;

    let mut stdout = io::stdout().lock();
    stdout.write_all(&pdf)?;
    stdout.flush()?;
    Ok(())
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error generating PDF: {e}");
        process::exit(1);
    }
}
