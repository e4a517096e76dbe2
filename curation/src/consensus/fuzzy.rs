//! Fuzzy reconciliation of free-text citations to shortlist entries.
//!
//! Generative providers paraphrase and mis-copy identifiers, so a returned
//! `{title, link}` pair is scored against every shortlist entry: exact link
//! equality short-circuits, link containment contributes a fixed weight, and
//! title token overlap (Jaccard) contributes up to one. A citation whose best
//! composite score does not clear the acceptance threshold is discarded,
//! never guessed.

use std::collections::HashSet;

use tracing::debug;

use crate::corpus::Candidate;

/// Minimum composite score before a citation is accepted.
pub const ACCEPT_THRESHOLD: f64 = 0.3;
/// Contribution of a substring link containment.
pub const LINK_CONTAINMENT_WEIGHT: f64 = 0.8;

/// Case-folded, punctuation-normalized token set.
fn clean_tokens(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity of two token sets, in [0, 1].
fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

/// Resolve a citation to a shortlist index, or `None` when unmatchable.
pub fn match_citation(title: &str, link: &str, shortlist: &[Candidate]) -> Option<usize> {
    let title_tokens = clean_tokens(title);
    let mut best_index = None;
    let mut best_score = 0.0;

    for (index, candidate) in shortlist.iter().enumerate() {
        // Exact link equality is the strongest signal and ends the search.
        if !link.is_empty() && link == candidate.link {
            return Some(index);
        }

        let mut score = 0.0;
        if !link.is_empty() && (candidate.link.contains(link) || link.contains(&candidate.link)) {
            score += LINK_CONTAINMENT_WEIGHT;
        }
        score += jaccard(&title_tokens, &clean_tokens(&candidate.title));

        if score > best_score {
            best_score = score;
            best_index = Some(index);
        }
    }

    if best_score > ACCEPT_THRESHOLD {
        best_index
    } else {
        debug!(title, link, best_score, "citation below acceptance threshold");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shortlist() -> Vec<Candidate> {
        vec![
            Candidate::new(
                "https://www.reddit.com/r/ml/comments/abc/post",
                "How I scraped 5.3 million jobs",
                "s",
            ),
            Candidate::new(
                "https://techcrunch.com/2026/02/07/data-centers",
                "Lawmakers propose a pause on new data centers",
                "s",
            ),
        ]
    }

    #[test]
    fn test_exact_link_wins_regardless_of_title() {
        let idx = match_citation(
            "completely unrelated words",
            "https://techcrunch.com/2026/02/07/data-centers",
            &shortlist(),
        );
        assert_eq!(idx, Some(1));
    }

    #[test]
    fn test_link_containment_plus_title_overlap() {
        // Provider dropped the path tail but kept most of the title.
        let idx = match_citation(
            "How I scraped 5.3 million jobs (including data science)",
            "https://www.reddit.com/r/ml/comments/abc",
            &shortlist(),
        );
        assert_eq!(idx, Some(0));
    }

    #[test]
    fn test_paraphrased_title_without_link() {
        let idx = match_citation("Lawmakers propose pause on data centers", "", &shortlist());
        assert_eq!(idx, Some(1));
    }

    #[test]
    fn test_no_overlap_is_discarded_not_guessed() {
        let idx = match_citation(
            "quantum basket weaving quarterly",
            "https://elsewhere.org/nothing",
            &shortlist(),
        );
        assert_eq!(idx, None);
    }

    #[test]
    fn test_empty_citation_is_unmatched() {
        assert_eq!(match_citation("", "", &shortlist()), None);
    }

    #[test]
    fn test_jaccard_bounds() {
        let a = clean_tokens("alpha beta gamma");
        let b = clean_tokens("Alpha, beta; GAMMA!");
        assert!((jaccard(&a, &b) - 1.0).abs() < 1e-9);
        let c = clean_tokens("delta");
        assert_eq!(jaccard(&a, &c), 0.0);
        assert_eq!(jaccard(&a, &clean_tokens("")), 0.0);
    }
}
