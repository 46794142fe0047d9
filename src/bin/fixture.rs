//! Helper binary spawned by the integration tests under `tests/`. Not meant
//! to be run directly: it parks a requested number of threads, or waits to
//! be killed, so the tests have a real, independently-scheduled process to
//! point `process_map`/`remote` at.

use std::env;

fn park_with_threads(num_threads: usize) -> ! {
    // One less than requested: the main thread counts as one of them.
    for _ in 1..num_threads {
        std::thread::spawn(|| loop {
            std::thread::park();
        });
    }
    println!("ready");
    loop {
        std::thread::park();
    }
}

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    match args.as_slice() {
        [] => park_with_threads(1),
        [count] => {
            let num: usize = count.parse().expect("thread count must be a number");
            park_with_threads(num);
        }
        _ => {
            eprintln!("usage: fixture [thread-count]");
            std::process::exit(2);
        }
    }
}
