//! Output Sink: formats a [`Sample`] into a collapsed-stack line suitable
//! for flamegraph tooling and writes it to stdout or a file.

use crate::sampler::Sample;
use std::io::{self, Write};

/// Escapes `;` as `\;` within a frame's name/filename, since `;` is both
/// the frame separator and the separator between a frame's
/// `<function> (<filename>)` part and its `L<line>` part.
fn escape_frame(name: &str) -> std::borrow::Cow<'_, str> {
    if name.contains(';') {
        std::borrow::Cow::Owned(name.replace(';', "\\;"))
    } else {
        std::borrow::Cow::Borrowed(name)
    }
}

/// Formats one sample as `P<pid>;T<tid>;<frame>;...;<frame> <metric>`,
/// where each `<frame>` is `<function> (<filename>);L<line>`.
pub fn format_line(sample: &Sample, metric: u64) -> String {
    let mut line = format!("P{};T{}", sample.pid, sample.tid);
    for frame in &sample.frames {
        line.push(';');
        line.push_str(&escape_frame(&format!(
            "{} ({})",
            frame.function, frame.filename
        )));
        line.push_str(";L");
        line.push_str(&frame.line.to_string());
    }
    line.push(' ');
    line.push_str(&metric.to_string());
    line
}

/// The core's only producer-side contract with the outside world.
pub trait Sink {
    fn write_sample(&mut self, sample: &Sample, metric: u64) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
}

pub struct WriterSink<W: Write> {
    writer: W,
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write> Sink for WriterSink<W> {
    fn write_sample(&mut self, sample: &Sample, metric: u64) -> io::Result<()> {
        writeln!(self.writer, "{}", format_line(sample, metric))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::RemoteFrame;

    #[test]
    fn formats_bit_exact_collapsed_line() {
        let sample = Sample {
            pid: 42,
            tid: 7,
            frames: vec![
                RemoteFrame {
                    function: "main".into(),
                    filename: "app.py".into(),
                    line: 10,
                },
                RemoteFrame {
                    function: "work".into(),
                    filename: "app.py".into(),
                    line: 20,
                },
            ],
        };
        assert_eq!(
            format_line(&sample, 10000),
            "P42;T7;main (app.py);L10;work (app.py);L20 10000"
        );
    }

    #[test]
    fn escapes_semicolons_in_frame_names() {
        let sample = Sample {
            pid: 1,
            tid: 1,
            frames: vec![RemoteFrame {
                function: "weird;name".into(),
                filename: "a.py".into(),
                line: 1,
            }],
        };
        assert_eq!(
            format_line(&sample, 1),
            "P1;T1;weird\\;name (a.py);L1 1"
        );
    }

    #[test]
    fn empty_stack_still_emits_header() {
        let sample = Sample {
            pid: 1,
            tid: 2,
            frames: vec![],
        };
        assert_eq!(format_line(&sample, 5), "P1;T2 5");
    }
}
