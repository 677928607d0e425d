//! URL matching for route registration: globs, regexes and predicates.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::{Value, json};

use crate::error::{Error, Result};

type Predicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

static HTTP_SCHEME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^https?://").expect("valid regex"));
static WS_SCHEME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^wss?://").expect("valid regex"));
static EMPTY_PATH: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^((?:https?|wss?)://[^/?#]*)([?#].*)?$").expect("valid regex"));

/// Decides whether a route applies to a URL.
#[derive(Clone)]
pub enum UrlMatcher {
	/// Matches every URL.
	Any,
	/// Playwright glob, resolved against the base URL when relative.
	Glob(GlobMatcher),
	/// Regex searched anywhere in the URL.
	Regex(Regex),
	/// Caller-supplied predicate, compared by identity.
	Predicate(Predicate),
}

impl UrlMatcher {
	/// Compiles `glob`, resolving it against `base_url` unless it starts with `*`.
	pub fn glob(base_url: Option<&str>, glob: &str) -> Result<Self> {
		GlobMatcher::new(base_url, glob).map(UrlMatcher::Glob)
	}

	pub fn regex(pattern: &str) -> Result<Self> {
		Regex::new(pattern)
			.map(UrlMatcher::Regex)
			.map_err(|e| Error::InvalidArgument(format!("Invalid url regex {pattern:?}: {e}")))
	}

	pub fn predicate<F>(predicate: F) -> Self
	where
		F: Fn(&str) -> bool + Send + Sync + 'static,
	{
		UrlMatcher::Predicate(Arc::new(predicate))
	}

	pub fn matches(&self, url: &str) -> bool {
		match self {
			UrlMatcher::Any => true,
			UrlMatcher::Glob(glob) => glob.matches(url),
			UrlMatcher::Regex(regex) => regex.is_match(url),
			UrlMatcher::Predicate(predicate) => predicate(url),
		}
	}
}

impl PartialEq for UrlMatcher {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(UrlMatcher::Any, UrlMatcher::Any) => true,
			(UrlMatcher::Glob(a), UrlMatcher::Glob(b)) => a.glob == b.glob,
			(UrlMatcher::Regex(a), UrlMatcher::Regex(b)) => a.as_str() == b.as_str(),
			(UrlMatcher::Predicate(a), UrlMatcher::Predicate(b)) => Arc::ptr_eq(a, b),
			_ => false,
		}
	}
}

impl std::fmt::Debug for UrlMatcher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			UrlMatcher::Any => f.write_str("<any>"),
			UrlMatcher::Glob(glob) => write!(f, "<glob pattern={:?}>", glob.glob),
			UrlMatcher::Regex(regex) => write!(f, "<regex pattern={:?}>", regex.as_str()),
			UrlMatcher::Predicate(_) => f.write_str("<predicate>"),
		}
	}
}

/// Compiled glob plus the variant used for websocket URLs when the base
/// URL is http(s).
#[derive(Clone, Debug)]
pub struct GlobMatcher {
	glob: String,
	regex: Regex,
	ws_regex: Option<Regex>,
}

impl GlobMatcher {
	fn new(base_url: Option<&str>, glob: &str) -> Result<Self> {
		if glob.starts_with('*') {
			return Ok(Self {
				glob: glob.to_string(),
				regex: compile_glob(glob)?,
				ws_regex: None,
			});
		}

		let regex = compile_glob(&normalise_url(&resolve_url(base_url, glob)))?;
		let ws_regex = match base_url {
			Some(base) if HTTP_SCHEME.is_match(base) => {
				let ws_base = format!("ws{}", &base[4..]);
				Some(compile_glob(&normalise_url(&resolve_url(Some(&ws_base), glob)))?)
			}
			_ => None,
		};
		Ok(Self {
			glob: glob.to_string(),
			regex,
			ws_regex,
		})
	}

	pub fn as_str(&self) -> &str {
		&self.glob
	}

	fn matches(&self, url: &str) -> bool {
		match &self.ws_regex {
			Some(ws_regex) if WS_SCHEME.is_match(url) => ws_regex.is_match(url),
			_ => self.regex.is_match(url),
		}
	}
}

fn compile_glob(glob: &str) -> Result<Regex> {
	let source = glob_to_regex(glob);
	Regex::new(&source).map_err(|e| Error::InvalidArgument(format!("Invalid url glob {glob:?}: {e}")))
}

/// Translates a Playwright glob into an anchored regex source.
///
/// `*` matches within one path segment, `**` between slashes (or the string
/// ends) matches any number of segments, `{a,b}` is alternation and `\` escapes
/// the next character.
pub fn glob_to_regex(glob: &str) -> String {
	const ESCAPED: &[char] = &['$', '^', '+', '.', '*', '(', ')', '|', '\\', '?', '{', '}', '[', ']'];
	let chars: Vec<char> = glob.chars().collect();
	let mut out = String::from("^");
	let mut in_group = false;
	let mut i = 0;

	while i < chars.len() {
		let c = chars[i];
		if c == '\\' && i + 1 < chars.len() {
			i += 1;
			push_literal(&mut out, chars[i], ESCAPED);
			i += 1;
			continue;
		}
		if c == '*' {
			let before = i.checked_sub(1).map(|j| chars[j]);
			let mut stars = 1;
			while chars.get(i + 1) == Some(&'*') {
				stars += 1;
				i += 1;
			}
			let after = chars.get(i + 1).copied();
			let deep = stars > 1 && matches!(before, None | Some('/')) && matches!(after, None | Some('/'));
			if deep {
				out.push_str("((?:[^/]*(?:/|$))*)");
				i += 1;
			} else {
				out.push_str("([^/]*)");
			}
			i += 1;
			continue;
		}
		match c {
			'{' => {
				in_group = true;
				out.push('(');
			}
			'}' => {
				in_group = false;
				out.push(')');
			}
			',' if in_group => out.push('|'),
			_ => push_literal(&mut out, c, ESCAPED),
		}
		i += 1;
	}

	out.push('$');
	out
}

fn push_literal(out: &mut String, c: char, escaped: &[char]) {
	if escaped.contains(&c) {
		out.push('\\');
	}
	out.push(c);
}

/// Joins a relative glob onto the base URL.
///
/// Globs the URL parser would percent-encode (`{`, `}`) stay unresolved.
fn resolve_url(base_url: Option<&str>, glob: &str) -> String {
	let Some(base_url) = base_url else {
		return glob.to_string();
	};
	if glob.contains(['{', '}']) {
		return glob.to_string();
	}
	url::Url::parse(base_url)
		.and_then(|base| base.join(glob))
		.map(|resolved| resolved.to_string())
		.unwrap_or_else(|_| glob.to_string())
}

/// Adds the `/` path an http(s)/ws(s) URL without one implicitly has.
fn normalise_url(url: &str) -> String {
	match EMPTY_PATH.captures(url) {
		Some(caps) => format!("{}/{}", &caps[1], caps.get(2).map_or("", |m| m.as_str())),
		None => url.to_string(),
	}
}

/// Builds the `{patterns}` payload for `set*InterceptionPatterns`.
///
/// Any predicate or match-all entry widens the interception to every URL.
pub fn interception_patterns<'a>(matchers: impl IntoIterator<Item = &'a UrlMatcher>) -> Value {
	let mut patterns = Vec::new();
	for matcher in matchers {
		match matcher {
			UrlMatcher::Glob(glob) => patterns.push(json!({ "glob": glob.glob })),
			UrlMatcher::Regex(regex) => patterns.push(json!({ "regexSource": regex.as_str(), "regexFlags": "" })),
			UrlMatcher::Any | UrlMatcher::Predicate(_) => {
				return json!({ "patterns": [{ "glob": "**/*" }] });
			}
		}
	}
	json!({ "patterns": patterns })
}
