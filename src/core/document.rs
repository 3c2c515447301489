use serde::{Deserialize, Serialize};

/// Coarse part-of-speech tag as emitted by the parse server.
///
/// Only the tags the extraction rules inspect get a variant of their own;
/// every other tag rides along opaquely in `Other` and is never matched on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PosTag {
    Noun,
    Propn,
    Verb,
    Adj,
    Other(String),
}

impl PosTag {
    pub fn is_nominal(&self) -> bool {
        matches!(self, PosTag::Noun | PosTag::Propn)
    }

    pub fn as_str(&self) -> &str {
        match self {
            PosTag::Noun => "NOUN",
            PosTag::Propn => "PROPN",
            PosTag::Verb => "VERB",
            PosTag::Adj => "ADJ",
            PosTag::Other(tag) => tag,
        }
    }
}

impl From<String> for PosTag {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "NOUN" => PosTag::Noun,
            "PROPN" => PosTag::Propn,
            "VERB" => PosTag::Verb,
            "ADJ" => PosTag::Adj,
            _ => PosTag::Other(tag),
        }
    }
}

impl From<PosTag> for String {
    fn from(tag: PosTag) -> Self {
        tag.as_str().to_string()
    }
}

/// One parsed word.
///
/// `head` is the index of the syntactic governor within the owning
/// sentence's token arena; the root token's head is its own index. Tokens
/// never own one another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub lemma: String,
    pub pos: PosTag,
    pub dep: String,
    pub head: usize,
}

impl Token {
    pub fn new(
        text: impl Into<String>,
        lemma: impl Into<String>,
        pos: PosTag,
        dep: impl Into<String>,
        head: usize,
    ) -> Self {
        Self {
            text: text.into(),
            lemma: lemma.into(),
            pos,
            dep: dep.into(),
            head,
        }
    }
}

/// One dependency tree: the token arena plus a child-index table derived
/// from the head links at construction time.
///
/// The single-root / acyclic invariant comes from the parser and is not
/// re-validated here.
#[derive(Debug, Clone)]
pub struct Sentence {
    tokens: Vec<Token>,
    children: Vec<Vec<usize>>,
}

impl Sentence {
    pub fn new(tokens: Vec<Token>) -> Self {
        let mut children = vec![Vec::new(); tokens.len()];
        for (index, token) in tokens.iter().enumerate() {
            // the root points at itself and is not its own child
            if token.head != index && token.head < tokens.len() {
                children[token.head].push(index);
            }
        }
        Self { tokens, children }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn token(&self, index: usize) -> &Token {
        &self.tokens[index]
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn head_index(&self, index: usize) -> usize {
        self.tokens[index].head
    }

    pub fn head_of(&self, index: usize) -> &Token {
        &self.tokens[self.tokens[index].head]
    }

    /// Indices of the tokens governed by `index`, in sentence order.
    pub fn children_of(&self, index: usize) -> &[usize] {
        &self.children[index]
    }
}

/// An ordered sequence of parsed sentences, produced per request by the
/// parser client and discarded after extraction.
#[derive(Debug, Clone, Default)]
pub struct Document {
    sentences: Vec<Sentence>,
}

impl Document {
    pub fn new(sentences: Vec<Sentence>) -> Self {
        Self { sentences }
    }

    pub fn sentences(&self) -> &[Sentence] {
        &self.sentences
    }

    pub fn sentence_count(&self) -> usize {
        self.sentences.len()
    }

    pub fn token_count(&self) -> usize {
        self.sentences.iter().map(Sentence::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pos_tag_round_trip() {
        assert_eq!(PosTag::from("VERB".to_string()), PosTag::Verb);
        assert_eq!(PosTag::from("PROPN".to_string()), PosTag::Propn);
        assert_eq!(
            PosTag::from("ADP".to_string()),
            PosTag::Other("ADP".to_string())
        );
        assert_eq!(PosTag::Other("ADP".to_string()).as_str(), "ADP");
        assert_eq!(String::from(PosTag::Noun), "NOUN");
    }

    #[test]
    fn test_pos_tag_nominal() {
        assert!(PosTag::Noun.is_nominal());
        assert!(PosTag::Propn.is_nominal());
        assert!(!PosTag::Verb.is_nominal());
        assert!(!PosTag::Other("ADV".to_string()).is_nominal());
    }

    #[test]
    fn test_children_table() {
        // "cat chased mouse": chased is root, cat and mouse hang off it
        let sentence = Sentence::new(vec![
            Token::new("cat", "cat", PosTag::Noun, "nsubj", 1),
            Token::new("chased", "chase", PosTag::Verb, "ROOT", 1),
            Token::new("mouse", "mouse", PosTag::Noun, "dobj", 1),
        ]);

        assert_eq!(sentence.children_of(1), &[0, 2]);
        assert!(sentence.children_of(0).is_empty());
        assert_eq!(sentence.head_index(0), 1);
        assert_eq!(sentence.head_of(2).text, "chased");
        // the root governs itself without appearing in its own child list
        assert_eq!(sentence.head_of(1).text, "chased");
    }

    #[test]
    fn test_empty_document() {
        let document = Document::default();
        assert!(document.is_empty());
        assert_eq!(document.sentence_count(), 0);
        assert_eq!(document.token_count(), 0);
    }
}
