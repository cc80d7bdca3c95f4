use search_core::tokenizer::tokenize;
use search_core::Document;

#[test]
fn it_normalizes_and_stems() {
    let toks = tokenize("Running Runners RUN! The café's menu.");
    let words: Vec<String> = toks.into_iter().map(|(w, _)| w).collect();
    assert!(words.contains(&"run".to_string()));
    // NFKC keeps the accent but folds compatibility forms
    assert!(words.iter().any(|w| w.starts_with("caf")));
}

#[test]
fn it_filters_stopwords_but_keeps_offsets() {
    let toks = tokenize("The quick brown fox and the lazy dog");
    let words: Vec<&str> = toks.iter().map(|(w, _)| w.as_str()).collect();
    assert!(!words.contains(&"the"));
    assert!(!words.contains(&"and"));
    assert_eq!(toks[0], ("quick".to_string(), 1));
    assert_eq!(toks.last(), Some(&("dog".to_string(), 7)));
}

#[test]
fn documents_from_text_carry_positions() {
    let doc = Document::from_text("u3", "Fox", "quick brown fox");
    assert_eq!(doc.positions["quick"], vec![0]);
    assert_eq!(doc.positions["brown"], vec![1]);
    assert_eq!(doc.positions["fox"], vec![2]);
    assert_eq!(doc.max_tf, 1);
}
