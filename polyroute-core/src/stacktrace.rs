// Best-effort stack-frame extraction for error diagnostics.
//
// The first three lines of a captured stack belong to the error-handling
// machinery itself and are skipped. The first remaining line is matched
// against two frame shapes:
//
//   at <method> (<file>:<line>:<col>)
//   at <file>:<line>:<col>
//
// Anything that does not match degrades to the raw stack text. Nothing in
// here may escape past the error handler.

/// What the extractor managed to decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackReport {
    Frame {
        method: String,
        /// Basename of the source path.
        file: String,
        line: u32,
        pos: u32,
        /// The remaining frame lines, joined.
        stack: String,
    },
    Raw(String),
}

/// Decode the topmost interesting frame of a stack text.
pub fn extract(stack: &str) -> StackReport {
    let lines: Vec<&str> = stack.lines().collect();
    if lines.len() <= 3 {
        return StackReport::Raw(stack.to_string());
    }
    let rest = &lines[3..];
    match rest.first().and_then(|line| parse_frame(line.trim())) {
        Some((method, path, line, pos)) => StackReport::Frame {
            method,
            file: basename(&path),
            line,
            pos,
            stack: rest.join("\n"),
        },
        None => StackReport::Raw(stack.to_string()),
    }
}

fn parse_frame(line: &str) -> Option<(String, String, u32, u32)> {
    let rest = line.strip_prefix("at ")?.trim();

    // Named shape: "<method> (<file>:<line>:<col>)".
    if rest.ends_with(')') {
        if let Some(open) = rest.rfind(" (") {
            let method = rest[..open].trim().to_string();
            let location = &rest[open + 2..rest.len() - 1];
            if let Some((path, line, pos)) = parse_location(location) {
                return Some((method, path, line, pos));
            }
        }
        return None;
    }

    // Anonymous shape: "<file>:<line>:<col>".
    parse_location(rest).map(|(path, line, pos)| (String::new(), path, line, pos))
}

fn parse_location(location: &str) -> Option<(String, u32, u32)> {
    let mut parts = location.rsplitn(3, ':');
    let pos = parts.next()?.parse().ok()?;
    let line = parts.next()?.parse().ok()?;
    let path = parts.next()?.to_string();
    if path.is_empty() {
        return None;
    }
    Some((path, line, pos))
}

fn basename(path: &str) -> String {
    path.rsplit(['/', '\\'])
        .next()
        .unwrap_or(path)
        .to_string()
}
