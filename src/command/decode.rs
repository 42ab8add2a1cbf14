//! Client-side decoding of a remote session's output stream.
//!
//! Commands that return secret material have their output parsed line by
//! line and each sealed field opened with the caller's private key as it is
//! read. A field that cannot be opened is reported on the error sink and
//! skipped; the rest of the stream is still rendered. Everything else is
//! passed through untouched.

use std::io::Write;

use rsa::RsaPrivateKey;

use crate::error::{CodecError, CryptoError, UndecryptableField};

use super::crypto;

/// Shape of a secret-bearing response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// One sealed value per line (`secret get`).
    Value,
    /// `KEY=<sealed>` per line (`secret list`, `inject`).
    KeyValue,
}

impl Layout {
    /// Layout of the response to the command at `path`, if it carries secrets.
    pub fn for_path(path: &str) -> Option<Layout> {
        match path {
            "secret get" => Some(Layout::Value),
            "secret list" | "inject" => Some(Layout::KeyValue),
            _ => None,
        }
    }
}

enum Mode {
    Passthrough,
    Secrets {
        key: Box<RsaPrivateKey>,
        layout: Layout,
        pending: Vec<u8>,
        line: usize,
    },
}

/// Streaming decoder writing rendered output to `out` and per-field
/// diagnostics to `err`.
pub struct ResponseDecoder<W: Write, E: Write> {
    mode: Mode,
    out: W,
    err: E,
    failures: Vec<UndecryptableField>,
}

impl<W: Write, E: Write> ResponseDecoder<W, E> {
    pub fn passthrough(out: W, err: E) -> Self {
        Self {
            mode: Mode::Passthrough,
            out,
            err,
            failures: Vec::new(),
        }
    }

    pub fn secrets(layout: Layout, key: RsaPrivateKey, out: W, err: E) -> Self {
        Self {
            mode: Mode::Secrets {
                key: Box::new(key),
                layout,
                pending: Vec::new(),
                line: 0,
            },
            out,
            err,
            failures: Vec::new(),
        }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self.mode, Mode::Passthrough)
    }

    /// Consume the next chunk of the stream.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<(), CodecError> {
        let lines = match &mut self.mode {
            Mode::Passthrough => {
                self.out.write_all(chunk)?;
                return Ok(());
            }
            Mode::Secrets { pending, .. } => {
                pending.extend_from_slice(chunk);
                let Some(last) = pending.iter().rposition(|b| *b == b'\n') else {
                    return Ok(());
                };
                let rest = pending.split_off(last + 1);
                std::mem::replace(pending, rest)
            }
        };

        for line in lines.split(|b| *b == b'\n') {
            self.render_line(line)?;
        }
        Ok(())
    }

    /// Forward a chunk of the remote error stream unchanged.
    pub fn feed_stderr(&mut self, chunk: &[u8]) -> Result<(), CodecError> {
        self.err.write_all(chunk)?;
        Ok(())
    }

    /// Flush any trailing partial line and report undecryptable fields.
    pub fn finish(mut self) -> Result<(), CodecError> {
        if let Mode::Secrets { pending, .. } = &mut self.mode {
            let rest = std::mem::take(pending);
            self.render_line(&rest)?;
        }
        self.out.flush()?;
        self.err.flush()?;

        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(CodecError::Undecryptable(self.failures))
        }
    }

    fn render_line(&mut self, raw: &[u8]) -> Result<(), CodecError> {
        let Mode::Secrets {
            key, layout, line, ..
        } = &mut self.mode
        else {
            return Ok(());
        };

        let text = String::from_utf8_lossy(raw);
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        *line += 1;

        let (field, rendered) = match layout {
            Layout::Value => {
                let field = format!("line {}", line);
                let rendered = open_utf8(key, text).map(|mut v| {
                    v.push('\n');
                    v
                });
                (field, rendered)
            }
            Layout::KeyValue => match text.split_once('=') {
                Some((name, sealed)) => {
                    let rendered =
                        open_utf8(key, sealed).map(|value| format!("{}={}\n", name, value));
                    (name.to_string(), rendered)
                }
                None => (
                    format!("line {}", line),
                    Err(CryptoError::Malformed("expected KEY=value".to_string())),
                ),
            },
        };

        match rendered {
            Ok(rendered) => self.out.write_all(rendered.as_bytes())?,
            Err(e) => {
                writeln!(self.err, "cannot decrypt {}: {}", field, e)?;
                self.failures.push(UndecryptableField {
                    field,
                    reason: e.to_string(),
                });
            }
        }
        Ok(())
    }
}

fn open_utf8(key: &RsaPrivateKey, sealed: &str) -> Result<String, CryptoError> {
    let plaintext = crypto::open(key, sealed)?;
    String::from_utf8(plaintext.to_vec())
        .map_err(|_| CryptoError::Decrypt("plaintext is not valid UTF-8".to_string()))
}
