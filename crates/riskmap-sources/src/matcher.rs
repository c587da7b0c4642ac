//! Markup stripping and country-name recognition in free text.

use std::{
  collections::BTreeSet,
  sync::LazyLock,
};

use regex::Regex;
use riskmap_core::country::CountryName;

use crate::config::Aliases;

static SCRIPTS: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?is)<(script|style|noscript)\b.*?</(script|style|noscript)\s*>").unwrap()
});
static TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static NUMERIC_ENTITY: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").unwrap());

/// Reduce an HTML page to its visible text: scripts and styles removed,
/// tags replaced by spaces, common entities decoded.
pub fn strip_markup(html: &str) -> String {
  let text = SCRIPTS.replace_all(html, " ");
  let text = TAGS.replace_all(&text, " ");
  let text = NUMERIC_ENTITY.replace_all(&text, |caps: &regex::Captures<'_>| {
    let raw = &caps[1];
    let code = match raw.strip_prefix('x') {
      Some(hex) => u32::from_str_radix(hex, 16).ok(),
      None => raw.parse().ok(),
    };
    code.and_then(char::from_u32).map(String::from).unwrap_or_default()
  });

  text
    .replace("&nbsp;", " ")
    .replace("&rsquo;", "'")
    .replace("&lsquo;", "'")
    .replace("&apos;", "'")
    .replace("&quot;", "\"")
    .replace("&lt;", "<")
    .replace("&gt;", ">")
    .replace("&amp;", "&")
}

/// Finds known country names in text.
///
/// Candidates are tried longest first and must sit on word boundaries, so
/// `"NIGER"` does not match inside `"NIGERIA"` and `"CONGO"` does not match
/// inside an already-matched `"DEMOCRATIC REPUBLIC OF THE CONGO"`.
pub struct CountryMatcher {
  needles: Vec<(String, CountryName)>,
}

impl CountryMatcher {
  /// Needles are every known name, every alias whose target is known, and
  /// the bare form of parenthesised names (`"MYANMAR"` for
  /// `"MYANMAR (BURMA)"`) unless that form is itself a known name.
  pub fn new(known: &[CountryName], aliases: &Aliases) -> Self {
    let known_set: BTreeSet<&CountryName> = known.iter().collect();
    let mut needles: Vec<(String, CountryName)> =
      known.iter().map(|n| (n.as_str().to_owned(), n.clone())).collect();

    for name in known {
      if let Some((bare, _)) = name.as_str().split_once('(')
        && let Some(bare) = CountryName::new(bare)
        && !known_set.contains(&bare)
      {
        needles.push((bare.as_str().to_owned(), name.clone()));
      }
    }
    for (alias, canonical) in aliases.iter() {
      if known_set.contains(canonical) {
        needles.push((alias.as_str().to_owned(), canonical.clone()));
      }
    }

    needles.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
    needles.dedup_by(|a, b| a.0 == b.0);
    Self { needles }
  }

  /// Every known country mentioned in `text`.
  pub fn find_all(&self, text: &str) -> BTreeSet<CountryName> {
    let Some(haystack) = CountryName::new(text) else {
      return BTreeSet::new();
    };
    let haystack = haystack.as_str();
    let mut taken = vec![false; haystack.len()];
    let mut found = BTreeSet::new();

    for (needle, country) in &self.needles {
      for (start, _) in haystack.match_indices(needle.as_str()) {
        let end = start + needle.len();
        if taken[start..end].iter().any(|t| *t) || !on_word_boundary(haystack, start, end) {
          continue;
        }
        taken[start..end].iter_mut().for_each(|t| *t = true);
        found.insert(country.clone());
      }
    }
    found
  }
}

fn on_word_boundary(text: &str, start: usize, end: usize) -> bool {
  let before = text[..start].chars().next_back();
  let after = text[end..].chars().next();
  !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
}
