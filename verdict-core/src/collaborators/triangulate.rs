//! Source-overlap triangulation.
//!
//! A claim counts as verified when evidence from at least two independent
//! hosts mentions it. Mentions are judged by keyword overlap: CJK bigrams
//! plus ASCII alphanumeric words.

use super::{SearchResults, Triangulation, Triangulator};
use crate::error::CollaboratorError;
use crate::types::Grade;
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Keywords a hit must share with the claim to count as supporting it.
const MIN_SHARED_KEYWORDS: usize = 2;

pub struct EvidenceTriangulator;

fn is_cjk(c: char) -> bool {
    matches!(c as u32, 0x4E00..=0x9FFF | 0x3400..=0x4DBF)
}

/// Extract overlap keywords from free text.
pub(crate) fn keywords(text: &str) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    let mut cjk_run: Vec<char> = Vec::new();
    let mut word = String::new();

    let flush_cjk = |run: &mut Vec<char>, out: &mut BTreeSet<String>| {
        for pair in run.windows(2) {
            out.insert(pair.iter().collect());
        }
        run.clear();
    };
    let flush_word = |word: &mut String, out: &mut BTreeSet<String>| {
        if word.chars().count() >= 2 {
            out.insert(word.to_lowercase());
        }
        word.clear();
    };

    for c in text.chars() {
        if is_cjk(c) {
            flush_word(&mut word, &mut out);
            cjk_run.push(c);
        } else if c.is_ascii_alphanumeric() {
            flush_cjk(&mut cjk_run, &mut out);
            word.push(c);
        } else {
            flush_cjk(&mut cjk_run, &mut out);
            flush_word(&mut word, &mut out);
        }
    }
    flush_cjk(&mut cjk_run, &mut out);
    flush_word(&mut word, &mut out);
    out
}

fn host_of(raw: &str) -> Option<String> {
    url::Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
}

fn triangulate_claim(claim: &str, evidence: &SearchResults) -> Triangulation {
    let claim_keywords = keywords(claim);
    if claim_keywords.is_empty() {
        return Triangulation::default();
    }
    let needed = MIN_SHARED_KEYWORDS.min(claim_keywords.len());

    let mut hosts = BTreeSet::new();
    let mut sources = Vec::new();
    for hit in &evidence.combined {
        let text = format!("{} {}", hit.title, hit.snippet).to_lowercase();
        let shared = claim_keywords
            .iter()
            .filter(|k| text.contains(k.as_str()))
            .count();
        if shared < needed {
            continue;
        }
        if let Some(host) = host_of(&hit.url) {
            hosts.insert(host);
            sources.push(hit.url.clone());
        }
    }

    let confidence = match hosts.len() {
        n if n >= 3 => Grade::A,
        2 => Grade::B,
        _ => Grade::C,
    };
    Triangulation {
        verified: hosts.len() >= 2,
        confidence,
        sources,
    }
}

#[async_trait]
impl Triangulator for EvidenceTriangulator {
    async fn triangulate(
        &self,
        claims: &[String],
        evidence: &SearchResults,
    ) -> Result<Vec<Triangulation>, CollaboratorError> {
        Ok(claims
            .iter()
            .map(|claim| triangulate_claim(claim, evidence))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::SearchHit;

    fn hit(url: &str, snippet: &str) -> SearchHit {
        SearchHit {
            url: url.to_string(),
            title: String::new(),
            snippet: snippet.to_string(),
        }
    }

    #[test]
    fn test_keywords_mix_cjk_and_ascii() {
        let kw = keywords("我有13万资金想做光伏项目 ROI");
        assert!(kw.contains("光伏"));
        assert!(kw.contains("项目"));
        assert!(kw.contains("13"));
        assert!(kw.contains("roi"));
        assert!(!kw.contains("我"));
    }

    #[tokio::test]
    async fn test_two_hosts_verify_with_grade_b() {
        let evidence = SearchResults {
            combined: vec![
                hit("https://www.nea.gov.cn/1", "分布式光伏项目补贴"),
                hit("https://news.example.com/2", "光伏项目投资回报"),
                hit("https://news.example.com/3", "光伏项目融资"),
            ],
            ..SearchResults::default()
        };
        let out = EvidenceTriangulator
            .triangulate(&["想做光伏项目".to_string()], &evidence)
            .await
            .unwrap();
        assert!(out[0].verified);
        assert_eq!(out[0].confidence, Grade::B);
        assert_eq!(out[0].sources.len(), 3);
    }

    #[tokio::test]
    async fn test_three_hosts_grade_a() {
        let evidence = SearchResults {
            combined: vec![
                hit("https://a.org/1", "光伏项目"),
                hit("https://b.org/1", "光伏项目"),
                hit("https://c.org/1", "光伏项目"),
            ],
            ..SearchResults::default()
        };
        let out = EvidenceTriangulator
            .triangulate(&["光伏项目".to_string()], &evidence)
            .await
            .unwrap();
        assert_eq!(out[0].confidence, Grade::A);
    }

    #[tokio::test]
    async fn test_no_evidence_is_unverified() {
        let out = EvidenceTriangulator
            .triangulate(&["光伏项目".to_string()], &SearchResults::default())
            .await
            .unwrap();
        assert_eq!(out[0], Triangulation::default());
    }
}
