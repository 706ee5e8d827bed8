use std::{
    env,
    io::{self, Write},
    process, thread,
    time::Duration,
};

fn parse_value<T: std::str::FromStr>(value: Option<String>, flag: &str) -> T {
    let value = value.unwrap_or_else(|| {
        eprintln!("missing value for {flag}");
        process::exit(2);
    });
    value.parse().unwrap_or_else(|_| {
        eprintln!("invalid value for {flag}: {value}");
        process::exit(2);
    })
}

fn write_repeated(mut writer: impl Write, mut bytes: usize, fill: u8) -> io::Result<()> {
    let buf = [fill; 8 * 1024];
    while bytes > 0 {
        let n = bytes.min(buf.len());
        writer.write_all(&buf[..n])?;
        bytes -= n;
    }
    writer.flush()
}

fn main() {
    let mut exit_code = 0;
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--stdout-bytes" => {
                let bytes = parse_value(args.next(), "--stdout-bytes");
                write_repeated(io::stdout().lock(), bytes, b'a').unwrap();
            }
            "--stderr-bytes" => {
                let bytes = parse_value(args.next(), "--stderr-bytes");
                write_repeated(io::stderr().lock(), bytes, b'b').unwrap();
            }
            "--stdout-line" => {
                let line: String = parse_value(args.next(), "--stdout-line");
                println!("{line}");
            }
            "--stderr-line" => {
                let line: String = parse_value(args.next(), "--stderr-line");
                eprintln!("{line}");
            }
            "--sleep-ms" => {
                let ms = parse_value(args.next(), "--sleep-ms");
                thread::sleep(Duration::from_millis(ms));
            }
            "--exit-code" => {
                exit_code = parse_value(args.next(), "--exit-code");
            }
            other => {
                eprintln!("unknown argument: {other}");
                process::exit(2);
            }
        }
    }
    process::exit(exit_code);
}
