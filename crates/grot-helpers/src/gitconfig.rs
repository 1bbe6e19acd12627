//! Minimal gitconfig parsing for the gitconfig helper.
//!
//! Only the values the repository façade asks for are modelled:
//! `core.repositoryformatversion`, `user.name`, `user.email`, and the
//! remotes with their urls. Includes, conditional sections, and the
//! rest of the format stay outside the sandbox boundary.

/// The subset of a gitconfig the helper serves.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GitConfig {
    pub repository_format_version: i64,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    /// (name, url) pairs in file order.
    pub remotes: Vec<(String, String)>,
}

impl GitConfig {
    /// Parse a config text, ignoring everything it does not model.
    pub fn parse(text: &str) -> Self {
        let mut config = Self::default();
        let mut section = Section::Other;

        for raw_line in text.lines() {
            let line = strip_comment(raw_line).trim();
            if line.is_empty() {
                continue;
            }

            if line.starts_with('[') {
                section = parse_section_header(line);
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            match (&section, key.as_str()) {
                (Section::Core, "repositoryformatversion") => {
                    if let Ok(v) = value.parse() {
                        config.repository_format_version = v;
                    }
                }
                (Section::User, "name") => config.author_name = Some(value.to_string()),
                (Section::User, "email") => config.author_email = Some(value.to_string()),
                (Section::Remote(name), "url") => {
                    config.remotes.push((name.clone(), value.to_string()));
                }
                _ => {}
            }
        }
        config
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Section {
    Core,
    User,
    Remote(String),
    Other,
}

fn parse_section_header(line: &str) -> Section {
    let inner = line.trim_start_matches('[').trim_end_matches(']').trim();
    if inner.eq_ignore_ascii_case("core") {
        return Section::Core;
    }
    if inner.eq_ignore_ascii_case("user") {
        return Section::User;
    }
    if let Some(rest) = inner
        .strip_prefix("remote ")
        .or_else(|| inner.strip_prefix("remote\t"))
    {
        let name = rest.trim().trim_matches('"');
        return Section::Remote(name.to_string());
    }
    Section::Other
}

fn strip_comment(line: &str) -> &str {
    match line.find(|c| c == '#' || c == ';') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_core_user_and_remotes() {
        let text = "\
[core]
\trepositoryformatversion = 0
\tfilemode = true
[user]
\tname = Flan Hacker
\temail = flan@example.com
# comment
[remote \"origin\"]
\turl = ssh://git@example.com/repo.git
\tfetch = +refs/heads/*:refs/remotes/origin/*
[remote \"backup\"]
\turl = https://example.org/repo.git
";
        let cfg = GitConfig::parse(text);
        assert_eq!(cfg.repository_format_version, 0);
        assert_eq!(cfg.author_name.as_deref(), Some("Flan Hacker"));
        assert_eq!(cfg.author_email.as_deref(), Some("flan@example.com"));
        assert_eq!(cfg.remotes.len(), 2);
        assert_eq!(cfg.remotes[0].0, "origin");
        assert_eq!(cfg.remotes[1].1, "https://example.org/repo.git");
    }

    #[test]
    fn unknown_sections_are_ignored() {
        let cfg = GitConfig::parse("[alias]\n\tco = checkout\n");
        assert_eq!(cfg, GitConfig::default());
    }

    #[test]
    fn comments_and_blank_lines_skipped() {
        let cfg = GitConfig::parse("; leading comment\n\n[user]\nname = A ; trailing\n");
        assert_eq!(cfg.author_name.as_deref(), Some("A"));
    }
}
