use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::document::{Document, PosTag, Sentence};
use crate::core::parser_client::{ExtractionError, ParserClient};
use crate::handlers::DocumentProcessor;

/// A single `(subject, predicate, object)` relation.
///
/// Equality, hashing and ordering are structural over the three fields,
/// which is what makes set-based deduplication work.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Triplet {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

impl Triplet {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }
}

impl fmt::Display for Triplet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.subject, self.predicate, self.object)
    }
}

/// Deduplicated set of triplets.
///
/// Insertion order is irrelevant; duplicates collapse by value equality and
/// iteration follows the derived `Triplet` ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TripletCollection {
    triplets: BTreeSet<Triplet>,
}

impl TripletCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, triplet: Triplet) -> bool {
        self.triplets.insert(triplet)
    }

    pub fn contains(&self, triplet: &Triplet) -> bool {
        self.triplets.contains(triplet)
    }

    pub fn len(&self) -> usize {
        self.triplets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triplets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Triplet> {
        self.triplets.iter()
    }

    pub fn to_vec(&self) -> Vec<Triplet> {
        self.triplets.iter().cloned().collect()
    }
}

impl Extend<Triplet> for TripletCollection {
    fn extend<T: IntoIterator<Item = Triplet>>(&mut self, iter: T) {
        self.triplets.extend(iter);
    }
}

impl FromIterator<Triplet> for TripletCollection {
    fn from_iter<T: IntoIterator<Item = Triplet>>(iter: T) -> Self {
        Self {
            triplets: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a TripletCollection {
    type Item = &'a Triplet;
    type IntoIter = std::collections::btree_set::Iter<'a, Triplet>;

    fn into_iter(self) -> Self::IntoIter {
        self.triplets.iter()
    }
}

/// Which extraction rule a token falls under.
///
/// A token gets at most one tag, assigned in this declaration order; the
/// dispatch below never falls through from one rule into another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenRule {
    SubjectBearing,
    Verb,
    Adjective,
    Preposition,
}

fn classify(dep: &str, pos: &PosTag) -> Option<TokenRule> {
    if dep.contains("subj") {
        Some(TokenRule::SubjectBearing)
    } else if *pos == PosTag::Verb {
        Some(TokenRule::Verb)
    } else if *pos == PosTag::Adj {
        Some(TokenRule::Adjective)
    } else if dep == "prep" {
        Some(TokenRule::Preposition)
    } else {
        None
    }
}

// dobj, iobj, pobj and the rest of the object family all contain "obj";
// "pobj" is tested separately to keep the label contract explicit
fn is_object(dep: &str) -> bool {
    dep.contains("obj") || dep.contains("pobj")
}

/// Stateless rule engine that walks dependency trees and emits triplets.
///
/// Deterministic for a given document, no side effects, never mutates its
/// input.
#[derive(Debug, Clone, Copy, Default)]
pub struct TripletExtractor;

impl TripletExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, document: &Document) -> TripletCollection {
        let mut triplets = TripletCollection::new();

        for sentence in document.sentences() {
            for index in 0..sentence.len() {
                match classify(&sentence.token(index).dep, &sentence.token(index).pos) {
                    Some(TokenRule::SubjectBearing) => {
                        self.subject_rule(sentence, index, &mut triplets)
                    }
                    Some(TokenRule::Verb) => self.verb_rule(sentence, index, &mut triplets),
                    Some(TokenRule::Adjective) => {
                        self.adjective_rule(sentence, index, &mut triplets)
                    }
                    Some(TokenRule::Preposition) => {
                        self.preposition_rule(sentence, index, &mut triplets)
                    }
                    None => {}
                }
            }
        }

        debug!(
            "extracted {} unique triplets from {} sentences",
            triplets.len(),
            document.sentence_count()
        );

        triplets
    }

    /// Rule 1: the token is a subject; its governor's first VERB child is
    /// the predicate, and that verb's obj/pobj children are the objects.
    fn subject_rule(&self, sentence: &Sentence, index: usize, out: &mut TripletCollection) {
        let subject = &sentence.token(index).text;
        let governor = sentence.head_index(index);

        let Some(predicate_index) = sentence
            .children_of(governor)
            .iter()
            .copied()
            .find(|&child| sentence.token(child).pos == PosTag::Verb)
        else {
            return;
        };

        let predicate = &sentence.token(predicate_index).lemma;
        if predicate.is_empty() {
            return;
        }

        for &child in sentence.children_of(predicate_index) {
            let object = sentence.token(child);
            if is_object(&object.dep) {
                out.insert(Triplet::new(
                    subject.clone(),
                    predicate.clone(),
                    object.text.clone(),
                ));
            }
        }
    }

    /// Rule 2: the token is a verb; its own children supply the subject
    /// (last subject child wins) and the objects.
    fn verb_rule(&self, sentence: &Sentence, index: usize, out: &mut TripletCollection) {
        let predicate = &sentence.token(index).lemma;
        if predicate.is_empty() {
            return;
        }

        let mut subject: Option<&str> = None;
        let mut objects: Vec<&str> = Vec::new();

        for &child in sentence.children_of(index) {
            let token = sentence.token(child);
            if token.dep.contains("subj") {
                subject = Some(&token.text);
            } else if is_object(&token.dep) {
                objects.push(&token.text);
            }
        }

        let Some(subject) = subject else {
            return;
        };

        for object in objects {
            out.insert(Triplet::new(subject, predicate.clone(), object));
        }
    }

    /// Rule 3: an adjective modifying a noun or proper noun becomes an
    /// "is" relation.
    fn adjective_rule(&self, sentence: &Sentence, index: usize, out: &mut TripletCollection) {
        let target = sentence.head_of(index);
        if target.pos.is_nominal() {
            out.insert(Triplet::new(
                target.text.clone(),
                "is",
                sentence.token(index).text.clone(),
            ));
        }
    }

    /// Rule 4: a preposition links its governor to each nominal child,
    /// labeled with the preposition's lemma.
    fn preposition_rule(&self, sentence: &Sentence, index: usize, out: &mut TripletCollection) {
        let head = &sentence.head_of(index).text;
        let lemma = &sentence.token(index).lemma;

        for &child in sentence.children_of(index) {
            let token = sentence.token(child);
            if token.pos.is_nominal() {
                out.insert(Triplet::new(head.clone(), lemma.clone(), token.text.clone()));
            }
        }
    }
}

/// Outcome of one extraction run, including per-source failures that were
/// downgraded to recorded errors rather than aborting a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub id: String,
    pub source: String,
    pub triplets: TripletCollection,
    pub parse_model: String,
    pub extracted_at: DateTime<Utc>,
    pub processing_time_seconds: f64,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ExtractionResult {
    pub fn new(
        source: impl Into<String>,
        parse_model: impl Into<String>,
        processing_time_seconds: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source: source.into(),
            triplets: TripletCollection::new(),
            parse_model: parse_model.into(),
            extracted_at: Utc::now(),
            processing_time_seconds,
            errors: Vec::new(),
        }
    }

    pub fn with_triplets(mut self, triplets: TripletCollection) -> Self {
        self.triplets = triplets;
        self
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.errors.push(error);
        self
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// End-to-end pipeline: ingestion, parsing, rule extraction.
///
/// Owns the singly-initialized parser client; everything downstream of the
/// parse is synchronous and request-scoped.
pub struct RelationExtractor {
    parser: ParserClient,
    processor: DocumentProcessor,
    extractor: TripletExtractor,
}

impl RelationExtractor {
    pub fn new(parser: ParserClient) -> Self {
        Self {
            parser,
            processor: DocumentProcessor::new(),
            extractor: TripletExtractor::new(),
        }
    }

    pub fn parse_model(&self) -> &str {
        &self.parser.model
    }

    /// Ingest one source (file path or URL), parse it, and extract.
    ///
    /// Ingestion and parse failures are recorded on the result instead of
    /// failing the call, so one bad source does not sink a batch.
    pub async fn extract_from_source(&self, source: &str) -> Result<ExtractionResult> {
        let start = Instant::now();

        if source.trim().is_empty() {
            return Err(
                ExtractionError::InvalidInput("empty source specification".to_string()).into(),
            );
        }

        info!("starting extraction from {}", source);

        let processed = match self.processor.process(source).await {
            Ok(doc) => doc,
            Err(e) => {
                let message = format!("failed to ingest {}: {}", source, e);
                warn!("{}", message);
                return Ok(ExtractionResult::new(
                    source,
                    self.parser.model.clone(),
                    start.elapsed().as_secs_f64(),
                )
                .with_error(message));
            }
        };

        debug!("ingested {} ({} bytes)", source, processed.text.len());

        self.parse_and_extract(source, &processed.text, start).await
    }

    /// Extract from literal text, skipping ingestion.
    pub async fn extract_text(&self, text: &str) -> Result<ExtractionResult> {
        let start = Instant::now();
        self.parse_and_extract("<text>", text, start).await
    }

    async fn parse_and_extract(
        &self,
        source: &str,
        text: &str,
        start: Instant,
    ) -> Result<ExtractionResult> {
        let document = match self.parser.parse(text).await {
            Ok(document) => document,
            Err(e) => {
                let message = format!("parse failed for {}: {}", source, e);
                warn!("{}", message);
                return Ok(ExtractionResult::new(
                    source,
                    self.parser.model.clone(),
                    start.elapsed().as_secs_f64(),
                )
                .with_error(message));
            }
        };

        let triplets = self.extractor.extract(&document);
        let processing_time = start.elapsed().as_secs_f64();

        info!(
            "extraction completed: {} triplets from {} in {:.2}s",
            triplets.len(),
            source,
            processing_time
        );

        Ok(
            ExtractionResult::new(source, self.parser.model.clone(), processing_time)
                .with_triplets(triplets),
        )
    }

    pub async fn extract_from_multiple(&self, sources: &[String]) -> Result<Vec<ExtractionResult>> {
        let mut results = Vec::with_capacity(sources.len());

        for source in sources {
            results.push(self.extract_from_source(source).await?);
        }

        Ok(results)
    }

    /// Union a batch into one result; set semantics are the deduplication.
    pub fn merge_results(&self, results: Vec<ExtractionResult>) -> Result<ExtractionResult> {
        if results.is_empty() {
            return Err(ExtractionError::InvalidInput("no results to merge".to_string()).into());
        }

        let mut triplets = TripletCollection::new();
        let mut errors = Vec::new();
        let mut total_time = 0.0;

        for result in &results {
            triplets.extend(result.triplets.iter().cloned());
            errors.extend(result.errors.iter().cloned());
            total_time += result.processing_time_seconds;
        }

        let mut merged = ExtractionResult::new("merged", self.parser.model.clone(), total_time)
            .with_triplets(triplets);
        merged.errors = errors;

        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::document::Token;

    fn doc(sentences: Vec<Sentence>) -> Document {
        Document::new(sentences)
    }

    // "the cat chased the mouse", minimally: chased is root, cat its
    // subject, mouse its object
    fn cat_chase_mouse() -> Document {
        doc(vec![Sentence::new(vec![
            Token::new("cat", "cat", PosTag::Noun, "nsubj", 1),
            Token::new("chased", "chase", PosTag::Verb, "ROOT", 1),
            Token::new("mouse", "mouse", PosTag::Noun, "dobj", 1),
        ])])
    }

    #[test]
    fn test_subject_verb_object_scenario() {
        let triplets = TripletExtractor::new().extract(&cat_chase_mouse());
        assert!(triplets.contains(&Triplet::new("cat", "chase", "mouse")));
    }

    #[test]
    fn test_subject_rule_through_governor() {
        // subject hangs off an auxiliary whose children include the real
        // verb: rule 1 reaches the predicate through the governor
        let document = doc(vec![Sentence::new(vec![
            Token::new("cat", "cat", PosTag::Noun, "nsubj", 1),
            Token::new("has", "have", PosTag::Other("AUX".to_string()), "ROOT", 1),
            Token::new("chased", "chase", PosTag::Verb, "xcomp", 1),
            Token::new("mouse", "mouse", PosTag::Noun, "dobj", 2),
        ])]);

        let triplets = TripletExtractor::new().extract(&document);
        assert!(triplets.contains(&Triplet::new("cat", "chase", "mouse")));
    }

    #[test]
    fn test_verb_rule_last_subject_wins() {
        // two subject children under one verb: only the later one survives
        let document = doc(vec![Sentence::new(vec![
            Token::new("dog", "dog", PosTag::Noun, "nsubj", 2),
            Token::new("cat", "cat", PosTag::Noun, "nsubj", 2),
            Token::new("ate", "eat", PosTag::Verb, "ROOT", 2),
            Token::new("fish", "fish", PosTag::Noun, "dobj", 2),
        ])]);

        let triplets = TripletExtractor::new().extract(&document);
        assert!(triplets.contains(&Triplet::new("cat", "eat", "fish")));
        assert!(!triplets.contains(&Triplet::new("dog", "eat", "fish")));
    }

    #[test]
    fn test_verb_rule_requires_subject() {
        let document = doc(vec![Sentence::new(vec![
            Token::new("ate", "eat", PosTag::Verb, "ROOT", 0),
            Token::new("fish", "fish", PosTag::Noun, "dobj", 0),
        ])]);

        assert!(TripletExtractor::new().extract(&document).is_empty());
    }

    #[test]
    fn test_verb_rule_multiple_objects() {
        let document = doc(vec![Sentence::new(vec![
            Token::new("cat", "cat", PosTag::Noun, "nsubj", 1),
            Token::new("ate", "eat", PosTag::Verb, "ROOT", 1),
            Token::new("fish", "fish", PosTag::Noun, "dobj", 1),
            Token::new("mice", "mouse", PosTag::Noun, "dobj", 1),
        ])]);

        let triplets = TripletExtractor::new().extract(&document);
        assert!(triplets.contains(&Triplet::new("cat", "eat", "fish")));
        assert!(triplets.contains(&Triplet::new("cat", "eat", "mice")));
    }

    #[test]
    fn test_adjective_rule_scenario() {
        // "red car": red modifies car
        let document = doc(vec![Sentence::new(vec![
            Token::new("red", "red", PosTag::Adj, "amod", 1),
            Token::new("car", "car", PosTag::Noun, "ROOT", 1),
        ])]);

        let triplets = TripletExtractor::new().extract(&document);
        assert_eq!(triplets.len(), 1);
        assert!(triplets.contains(&Triplet::new("car", "is", "red")));
    }

    #[test]
    fn test_adjective_rule_ignores_non_nominal_head() {
        let document = doc(vec![Sentence::new(vec![
            Token::new("fast", "fast", PosTag::Adj, "acomp", 1),
            Token::new("ran", "run", PosTag::Verb, "ROOT", 1),
        ])]);

        // the verb has no subject child either, so nothing at all comes out
        assert!(TripletExtractor::new().extract(&document).is_empty());
    }

    #[test]
    fn test_preposition_rule_scenario() {
        // "sat in garden": in governs garden, sat governs in
        let document = doc(vec![Sentence::new(vec![
            Token::new("sat", "sit", PosTag::Verb, "ROOT", 0),
            Token::new("in", "in", PosTag::Other("ADP".to_string()), "prep", 0),
            Token::new("garden", "garden", PosTag::Noun, "pobj", 1),
        ])]);

        let triplets = TripletExtractor::new().extract(&document);
        assert!(triplets.contains(&Triplet::new("sat", "in", "garden")));
    }

    #[test]
    fn test_preposition_rule_skips_non_nominal_children() {
        let document = doc(vec![Sentence::new(vec![
            Token::new("sat", "sit", PosTag::Verb, "ROOT", 0),
            Token::new("in", "in", PosTag::Other("ADP".to_string()), "prep", 0),
            Token::new("there", "there", PosTag::Other("ADV".to_string()), "pobj", 1),
        ])]);

        let triplets = TripletExtractor::new().extract(&document);
        assert!(!triplets.contains(&Triplet::new("sat", "in", "there")));
    }

    #[test]
    fn test_priority_subject_beats_verb() {
        // "running" matches both the subject criterion (csubj) and the verb
        // criterion (VERB). the subject rule alone must fire: it takes
        // "running" itself as subject, while the verb rule would instead
        // have read the subject from the nsubj child "he".
        let document = doc(vec![Sentence::new(vec![
            Token::new("running", "run", PosTag::Verb, "csubj", 1),
            Token::new("matters", "matter", PosTag::Verb, "ROOT", 1),
            Token::new("marathon", "marathon", PosTag::Noun, "dobj", 0),
            Token::new("he", "he", PosTag::Noun, "nsubj", 0),
        ])]);

        let triplets = TripletExtractor::new().extract(&document);
        assert!(triplets.contains(&Triplet::new("running", "run", "marathon")));
        assert!(!triplets.contains(&Triplet::new("he", "run", "marathon")));
    }

    #[test]
    fn test_priority_verb_beats_preposition() {
        // classification is exclusive: a VERB token with dep "prep" takes
        // the verb rule, so its nominal child is not emitted as a
        // prepositional relation
        let document = doc(vec![Sentence::new(vec![
            Token::new("following", "follow", PosTag::Verb, "prep", 0),
            Token::new("rules", "rule", PosTag::Noun, "pobj", 0),
        ])]);

        // verb rule found an object but no subject child
        assert!(TripletExtractor::new().extract(&document).is_empty());
    }

    #[test]
    fn test_unmatched_tokens_contribute_nothing() {
        let document = doc(vec![Sentence::new(vec![Token::new(
            "quickly",
            "quickly",
            PosTag::Other("ADV".to_string()),
            "advmod",
            0,
        )])]);

        assert!(TripletExtractor::new().extract(&document).is_empty());
    }

    #[test]
    fn test_empty_document() {
        assert!(TripletExtractor::new()
            .extract(&Document::default())
            .is_empty());
    }

    #[test]
    fn test_determinism() {
        let document = cat_chase_mouse();
        let extractor = TripletExtractor::new();
        assert_eq!(extractor.extract(&document), extractor.extract(&document));
    }

    #[test]
    fn test_deduplication_is_idempotent() {
        let raw = vec![
            Triplet::new("cat", "chase", "mouse"),
            Triplet::new("cat", "chase", "mouse"),
            Triplet::new("car", "is", "red"),
        ];

        let once: TripletCollection = raw.iter().cloned().collect();
        let twice: TripletCollection = once.iter().cloned().collect();
        assert_eq!(once.len(), 2);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_overlapping_rules_deduplicate() {
        // the subject's governor is the verb itself: rule 1 looks among the
        // verb's children for a verbal predicate and finds none, while rule
        // 2 emits the pair once. nothing is double-counted.
        let triplets = TripletExtractor::new().extract(&cat_chase_mouse());
        assert_eq!(triplets.len(), 1);
    }

    #[test]
    fn test_collection_insert_and_contains() {
        let mut collection = TripletCollection::new();
        assert!(collection.insert(Triplet::new("a", "b", "c")));
        assert!(!collection.insert(Triplet::new("a", "b", "c")));
        assert!(collection.contains(&Triplet::new("a", "b", "c")));
        assert_eq!(collection.len(), 1);
    }

    fn pipeline(base_url: String) -> RelationExtractor {
        let client = ParserClient::new(base_url, "en_core_web_sm".to_string(), 5).unwrap();
        RelationExtractor::new(client)
    }

    #[tokio::test]
    async fn test_parse_failure_recorded_on_result() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/parse")
            .with_status(500)
            .with_body("model load failed")
            .create_async()
            .await;

        let result = pipeline(server.url()).extract_text("some text").await.unwrap();
        assert!(result.has_errors());
        assert!(result.triplets.is_empty());
        assert!(result.errors[0].contains("parse failed"));
    }

    #[tokio::test]
    async fn test_ingestion_failure_does_not_sink_batch() {
        let extractor = pipeline("http://localhost:9".to_string());
        let sources = vec!["/no/such/file.txt".to_string()];

        let results = extractor.extract_from_multiple(&sources).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].has_errors());
    }

    #[tokio::test]
    async fn test_empty_source_is_invalid_input() {
        let extractor = pipeline("http://localhost:9".to_string());
        let err = extractor.extract_from_source("   ").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ExtractionError>(),
            Some(ExtractionError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_merge_results_unions_and_keeps_errors() {
        let extractor = pipeline("http://localhost:9".to_string());

        let first = ExtractionResult::new("a.txt", "en_core_web_sm", 0.1).with_triplets(
            [Triplet::new("cat", "chase", "mouse")].into_iter().collect(),
        );
        let second = ExtractionResult::new("b.txt", "en_core_web_sm", 0.2)
            .with_triplets(
                [
                    Triplet::new("cat", "chase", "mouse"),
                    Triplet::new("car", "is", "red"),
                ]
                .into_iter()
                .collect(),
            )
            .with_error("partial parse".to_string());

        let merged = extractor.merge_results(vec![first, second]).unwrap();
        assert_eq!(merged.triplets.len(), 2);
        assert_eq!(merged.errors, vec!["partial parse".to_string()]);

        assert!(extractor.merge_results(Vec::new()).is_err());
    }
}
