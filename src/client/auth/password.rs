//! Passphrase input for encrypted identity files.

use std::io;

use zeroize::Zeroizing;

/// Source of key passphrases. The prompt itself is written by the caller.
pub trait PasswordReader {
    fn read_password(&mut self) -> io::Result<Zeroizing<String>>;
}

/// Reads from the terminal with echo disabled.
#[derive(Debug, Default)]
pub struct TerminalPasswordReader;

impl PasswordReader for TerminalPasswordReader {
    fn read_password(&mut self) -> io::Result<Zeroizing<String>> {
        let line = console::Term::stderr().read_secure_line()?;
        // The prompt was written without a newline and echo was off.
        eprintln!();
        Ok(Zeroizing::new(line))
    }
}
