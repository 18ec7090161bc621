// ABOUTME: Minimal dotenv reader/writer that preserves unrelated lines.
// ABOUTME: Used to inject runtime variables into the application's .env file.

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Entry { key: String, value: String },
    Other(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvFile {
    lines: Vec<Line>,
}

impl EnvFile {
    pub fn parse(text: &str) -> Self {
        let lines = text
            .lines()
            .map(|raw| match parse_entry(raw) {
                Some((key, value)) => Line::Entry { key, value },
                None => Line::Other(raw.to_string()),
            })
            .collect();
        Self { lines }
    }

    /// Last definition wins, matching how dotenv loaders behave.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().rev().find_map(|line| match line {
            Line::Entry { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Replace every definition of `key` in place, or append one.
    pub fn set(&mut self, key: &str, value: &str) {
        let mut found = false;
        for line in &mut self.lines {
            if let Line::Entry { key: k, value: v } = line
                && k == key
            {
                *v = value.to_string();
                found = true;
            }
        }
        if !found {
            self.lines.push(Line::Entry {
                key: key.to_string(),
                value: value.to_string(),
            });
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.lines.iter().filter_map(|line| match line {
            Line::Entry { key, value } => Some((key.as_str(), value.as_str())),
            Line::Other(_) => None,
        })
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Entry { key, value } => {
                    out.push_str(key);
                    out.push('=');
                    out.push_str(&quote(value));
                }
                Line::Other(raw) => out.push_str(raw),
            }
            out.push('\n');
        }
        out
    }
}

fn parse_entry(raw: &str) -> Option<(String, String)> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
    let (key, value) = trimmed.split_once('=')?;
    let key = key.trim();
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((key.to_string(), unquote(value.trim())))
}

fn unquote(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        return value[1..value.len() - 1].replace("\\\"", "\"");
    }
    if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
        return value[1..value.len() - 1].to_string();
    }
    value.to_string()
}

fn quote(value: &str) -> String {
    let plain = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "._-:/@+,%".contains(c));
    if plain {
        value.to_string()
    } else {
        format!("\"{}\"", value.replace('"', "\\\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_forms() {
        let env = EnvFile::parse("# comment\nexport A=1\nB = \"two words\"\nC='x'\nnot a line\n");
        assert_eq!(env.get("A"), Some("1"));
        assert_eq!(env.get("B"), Some("two words"));
        assert_eq!(env.get("C"), Some("x"));
        assert_eq!(env.get("D"), None);
    }

    #[test]
    fn set_replaces_in_place_and_keeps_comments() {
        let mut env = EnvFile::parse("# keep\nPORT=5000\nDEBUG=1\n");
        env.set("PORT", "8080");
        env.set("HOST", "0.0.0.0");
        assert_eq!(env.render(), "# keep\nPORT=8080\nDEBUG=1\nHOST=0.0.0.0\n");
    }

    #[test]
    fn render_quotes_when_needed() {
        let mut env = EnvFile::default();
        env.set("URL", "postgresql://u:p@db:5432/app");
        env.set("GREETING", "hello world");
        assert_eq!(
            env.render(),
            "URL=postgresql://u:p@db:5432/app\nGREETING=\"hello world\"\n"
        );
        assert_eq!(EnvFile::parse(&env.render()), env);
    }
}
