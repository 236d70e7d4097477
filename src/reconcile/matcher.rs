//! Literal infix matching of candidate identifiers against free-text fields

/// Derive a candidate identifier from a quantifier column header.
///
/// Drops any directory prefix, then removes the first matching suffix in
/// `suffixes` (e.g. the aligner's `Aligned.sortedByCoord.out.bam`).
pub fn candidate_from_header(header: &str, suffixes: &[String]) -> String {
    let trimmed = header.trim().trim_matches('"');
    let base = trimmed.rsplit(['/', '\\']).next().unwrap_or(trimmed);
    for suffix in suffixes {
        if suffix.is_empty() {
            continue;
        }
        if let Some(stripped) = base.strip_suffix(suffix.as_str()) {
            return stripped.to_string();
        }
    }
    base.to_string()
}

/// Case handling shared by the matcher functions
#[derive(Debug, Clone, Copy)]
pub(crate) struct Matcher {
    pub ignore_case: bool,
}

impl Matcher {
    fn fold<'a>(&self, s: &'a str) -> std::borrow::Cow<'a, str> {
        if self.ignore_case {
            std::borrow::Cow::Owned(s.to_lowercase())
        } else {
            std::borrow::Cow::Borrowed(s)
        }
    }

    /// Index of the candidate found at the leftmost position of `text`.
    /// Among candidates starting at the same position the earliest in
    /// `candidates` wins, which is how an alternation pattern resolves.
    pub fn leftmost(&self, text: &str, candidates: &[String]) -> Option<usize> {
        let text = self.fold(text);
        let mut best: Option<(usize, usize)> = None;
        for (k, cand) in candidates.iter().enumerate() {
            if cand.is_empty() {
                continue;
            }
            if let Some(pos) = text.find(self.fold(cand).as_ref()) {
                if best.map_or(true, |(p, _)| pos < p) {
                    best = Some((pos, k));
                }
            }
        }
        best.map(|(_, k)| k)
    }

    /// Indices of every candidate occurring anywhere in `text`
    pub fn all(&self, text: &str, candidates: &[String]) -> Vec<usize> {
        let text = self.fold(text);
        candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_empty() && text.contains(self.fold(c).as_ref()))
            .map(|(k, _)| k)
            .collect()
    }

    /// Rows of `fields` containing `candidate`, in table order
    pub fn rows_containing(&self, candidate: &str, fields: &[String]) -> Vec<usize> {
        let needle = self.fold(candidate);
        fields
            .iter()
            .enumerate()
            .filter(|(_, f)| self.fold(f).contains(needle.as_ref()))
            .map(|(i, _)| i)
            .collect()
    }
}
