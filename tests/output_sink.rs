//! Exercises [`WriterSink`] against a real file on disk, the path the CLI
//! front-end uses for `--output`.

use stackshot::sampler::{RemoteFrame, Sample};
use stackshot::{Sink, WriterSink};
use std::io::Read;

#[test]
fn writer_sink_appends_one_line_per_sample_and_flushes() {
    let file = tempfile::NamedTempFile::new().expect("failed to create temp file");
    let mut sink = WriterSink::new(file.reopen().expect("failed to reopen temp file"));

    let sample_a = Sample {
        pid: 100,
        tid: 1,
        frames: vec![RemoteFrame {
            function: "main".into(),
            filename: "app.py".into(),
            line: 3,
        }],
    };
    let sample_b = Sample {
        pid: 100,
        tid: 2,
        frames: vec![],
    };

    sink.write_sample(&sample_a, 10_000).unwrap();
    sink.write_sample(&sample_b, 10_000).unwrap();
    sink.flush().unwrap();
    drop(sink);

    let mut contents = String::new();
    std::fs::File::open(file.path())
        .unwrap()
        .read_to_string(&mut contents)
        .unwrap();

    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines, vec!["P100;T1;main (app.py);L3 10000", "P100;T2 10000"]);
}
