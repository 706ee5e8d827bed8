//! Understands exactly the flags `RipgrepScanner` passes, prints `--vimgrep`
//! style output and mirrors ripgrep's exit codes (0 found, 1 none, 2 error).
//! `-g` only honours `!name` excludes matched against file and folder names.

use std::{
    env, fs,
    io::{self, Write},
    path::{Path, PathBuf},
    process,
};

fn fail(message: &str) -> ! {
    eprintln!("{message}");
    process::exit(2);
}

fn collect_files(path: &Path, excludes: &[String], out: &mut Vec<PathBuf>) {
    if path.is_dir() {
        let Ok(entries) = fs::read_dir(path) else {
            return;
        };
        let mut children: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
        children.sort();
        for child in children {
            let name = child
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if excludes.iter().any(|exclude| *exclude == name) {
                continue;
            }
            collect_files(&child, excludes, out);
        }
    } else if path.is_file() {
        out.push(path.to_path_buf());
    }
}

fn main() {
    let mut pattern = None;
    let mut excludes = Vec::new();
    let mut target = None;
    let mut null = false;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--no-messages" | "--vimgrep" | "-H" | "--column" | "--line-number" => {}
            "--null" => null = true,
            "--color" => {
                args.next();
            }
            "-e" => pattern = args.next(),
            "-g" => {
                let glob = args.next().unwrap_or_else(|| fail("missing value for -g"));
                if let Some(name) = glob.strip_prefix('!') {
                    excludes.push(name.to_string());
                }
            }
            other if other.starts_with('-') => fail(&format!("unsupported flag: {other}")),
            other => target = Some(PathBuf::from(other)),
        }
    }

    let pattern = pattern.unwrap_or_else(|| fail("missing -e pattern"));
    let target = target.unwrap_or_else(|| fail("missing search path"));
    let re = regex::Regex::new(&pattern)
        .unwrap_or_else(|err| fail(&format!("regex parse error:\n{err}")));

    let mut files = Vec::new();
    collect_files(&target, &excludes, &mut files);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut found = false;
    for file in files {
        let Ok(text) = fs::read_to_string(&file) else {
            continue;
        };
        for (idx, line) in text.lines().enumerate() {
            if let Some(m) = re.find(line) {
                found = true;
                let separator = if null { '\0' } else { ':' };
                let _ = writeln!(
                    out,
                    "{}{separator}{}:{}:{}",
                    file.display(),
                    idx + 1,
                    m.start() + 1,
                    line
                );
            }
        }
    }
    let _ = out.flush();

    process::exit(if found { 0 } else { 1 });
}
