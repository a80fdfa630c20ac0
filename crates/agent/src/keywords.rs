//! Case- and whitespace-insensitive term matching shared by the keyword classifier,
//! the keyword input gate and the built-in handlers.

/// Terms shorter than this are only matched against whole tokens. Longer terms are also
/// searched in the whitespace-free form of the text, which catches `re fund` and `R E F U N D`.
const MIN_COMPACT_TERM_LEN: usize = 5;

/// Short words a run-together utterance may carry around a term (`iwantarefund`). A
/// whitespace-free match may only extend into a token when the rest of that token splits
/// into these words, so `border` never yields `order`.
const FILLER_WORDS: &[&str] = &[
    "i", "a", "an", "the", "my", "me", "we", "our", "you", "your", "it", "is", "am", "are",
    "to", "for", "of", "on", "in", "and", "do", "can", "could", "would", "like", "want",
    "need", "get", "give", "got", "some", "please", "pls", "now", "back", "how", "what",
    "where", "when", "why", "with", "this", "that", "just", "help",
];

/// Endings a whitespace-free match may leave on its last token (`re funds`).
const INFLECTIONS: &[&str] = &["s", "es", "ed", "ing"];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeywordSet {
    terms: Vec<String>,
}

impl KeywordSet {
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let terms = terms
            .into_iter()
            .map(|term| tokens(term.as_ref()).join(" "))
            .filter(|term| !term.is_empty())
            .collect();
        Self { terms }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// First term found in `text`, in declaration order.
    pub fn find_in(&self, text: &str) -> Option<&str> {
        let words = tokens(text);
        let phrase = format!(" {} ", words.join(" "));

        let on_tokens = self.terms.iter().find(|term| {
            if term.contains(' ') {
                phrase.contains(&format!(" {term} "))
            } else {
                words.iter().any(|word| word.starts_with(term.as_str()))
            }
        });
        if let Some(term) = on_tokens {
            return Some(term.as_str());
        }

        let compact = CompactText::new(&words);
        self.terms
            .iter()
            .find(|term| {
                let needle = term.replace(' ', "");
                needle.len() >= MIN_COMPACT_TERM_LEN && compact.contains_aligned(&needle)
            })
            .map(String::as_str)
    }

    pub fn matches(&self, text: &str) -> bool {
        self.find_in(text).is_some()
    }
}

/// Tokens concatenated without separators, remembering where each token starts.
struct CompactText<'a> {
    words: &'a [String],
    text: String,
    starts: Vec<usize>,
}

impl<'a> CompactText<'a> {
    fn new(words: &'a [String]) -> Self {
        let mut text = String::new();
        let mut starts = Vec::with_capacity(words.len());
        for word in words {
            starts.push(text.len());
            text.push_str(word);
        }
        Self { words, text, starts }
    }

    /// Index of the token covering byte `offset` of the compact text.
    fn token_at(&self, offset: usize) -> usize {
        self.starts.partition_point(|start| *start <= offset).saturating_sub(1)
    }

    /// Whether `needle` occurs with each end either on a token boundary or separated from
    /// the boundary only by filler words (or an inflection, at the tail).
    fn contains_aligned(&self, needle: &str) -> bool {
        self.text.match_indices(needle).any(|(start, matched)| {
            let end = start + matched.len();
            let first = self.token_at(start);
            let last = self.token_at(end - 1);

            let head = &self.words[first][..start - self.starts[first]];
            let tail = &self.words[last][end - self.starts[last]..];
            splits_into_fillers(head) && is_inflected_tail(tail)
        })
    }
}

fn is_inflected_tail(tail: &str) -> bool {
    splits_into_fillers(tail)
        || INFLECTIONS.iter().any(|ending| {
            tail.strip_prefix(*ending).is_some_and(splits_into_fillers)
        })
}

/// Whether `text` is empty or a run of [`FILLER_WORDS`].
fn splits_into_fillers(text: &str) -> bool {
    let mut reachable = vec![false; text.len() + 1];
    reachable[0] = true;
    for start in 0..text.len() {
        if !reachable[start] || !text.is_char_boundary(start) {
            continue;
        }
        for word in FILLER_WORDS {
            if text[start..].starts_with(word) {
                reachable[start + word.len()] = true;
            }
        }
    }
    reachable[text.len()]
}

/// Lowercased alphanumeric runs of `text`.
pub fn tokens(text: &str) -> Vec<String> {
    text.split(|character: char| !character.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}
