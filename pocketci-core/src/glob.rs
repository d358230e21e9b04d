//! Path matching for `changes`/`onChanges` trigger filters
//!
//! User pipelines declare `doublestar`-style patterns: `**` spans any number
//! of path components (including zero) and `*` never crosses a separator.
//! A `**` glued to other characters inside a single component (as in the
//! common `**/**.go` default) behaves like a plain `*`.

use globset::GlobBuilder;
use tracing::debug;

/// Returns true when at least one file matches at least one pattern.
///
/// Patterns that fail to compile are skipped, mirroring the lenient matching
/// users get from CI path filters: a bad pattern never takes the whole
/// trigger down with it.
pub fn match_any<F, P>(files: &[F], patterns: &[P]) -> bool
where
    F: AsRef<str>,
    P: AsRef<str>,
{
    let matchers: Vec<_> = patterns
        .iter()
        .filter_map(|pattern| {
            let normalized = normalize(pattern.as_ref());
            match GlobBuilder::new(&normalized).literal_separator(true).build() {
                Ok(glob) => Some(glob.compile_matcher()),
                Err(err) => {
                    debug!("skipping invalid pattern {:?}: {err}", pattern.as_ref());
                    None
                }
            }
        })
        .collect();

    files
        .iter()
        .any(|file| matchers.iter().any(|m| m.is_match(file.as_ref())))
}

/// Rewrites a doublestar pattern into `globset` syntax: any `**` that is not
/// a whole path component degrades to `*`.
fn normalize(pattern: &str) -> String {
    pattern
        .split('/')
        .map(|component| {
            if component != "**" && component.contains("**") {
                component.replace("**", "*")
            } else {
                component.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
