use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tagtree_core::Match;

/// Parse one line of `rg --vimgrep` output.
///
/// With `--null` the path is terminated by a NUL byte (`path\0line:column:text`)
/// and may contain any character. Without it the line is `path:line:column:text`
/// and the path may only carry a `:` in a Windows drive prefix (`C:\...`).
/// Relative paths are resolved against `cwd`. Returns `None` for lines that don't
/// have either shape.
pub fn parse_vimgrep_line(line: &str, cwd: &Path) -> Option<Match> {
    let line = line.trim_end_matches('\r');
    let (file, rest) = match line.split_once('\0') {
        Some(split) => split,
        None => split_colon_path(line)?,
    };
    if file.is_empty() {
        return None;
    }

    let mut fields = rest.splitn(3, ':');
    let line_number = fields.next()?.parse().ok()?;
    let column = fields.next()?.parse().ok()?;
    let text = fields.next()?;

    Some(Match::new(resolve(file, cwd), line_number, column, text))
}

fn split_colon_path(line: &str) -> Option<(&str, &str)> {
    static PATH_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = PATH_RE.get_or_init(|| {
        regex::Regex::new(r"^(?:[A-Za-z]:[\\/])?[^:]+")
            .expect("vimgrep path regex should compile")
    });

    let path = re.find(line)?;
    let rest = line[path.end()..].strip_prefix(':')?;
    Some((path.as_str(), rest))
}

fn resolve(file: &str, cwd: &Path) -> PathBuf {
    let path = Path::new(file);
    // Drive-prefixed paths are absolute even when parsed on a non-Windows host.
    let drive = matches!(file.as_bytes(), [letter, b':', b'\\' | b'/', ..] if letter.is_ascii_alphabetic());
    if path.is_absolute() || drive {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

/// Parse full `rg --vimgrep` output, skipping malformed lines.
pub fn parse_vimgrep_output(output: &str, cwd: &Path) -> Vec<Match> {
    let mut matches = Vec::new();
    for line in output.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_vimgrep_line(line, cwd) {
            Some(m) => matches.push(m),
            None => tracing::trace!(target: "tagtree.rg", line, "skipping malformed output line"),
        }
    }
    matches
}
