use draftproof::{split_sections, PREFACE_LABEL};

#[test]
fn split_recognizes_numbered_headings() {
    let text = "1 Intro\nHello\n2 Body\nWorld\n";
    let map = split_sections(text);
    assert_eq!(map.labels(), &["1 Intro".to_string(), "2 Body".to_string()]);
    assert_eq!(map.text("1 Intro"), Some("1 Intro\nHello\n"));
    assert_eq!(map.text("2 Body"), Some("2 Body\nWorld\n"));
}

#[test]
fn split_recognizes_dotted_ids() {
    let text = "3 Overview\nx\n3.2 Detail\ny\n3.2.1 Deep dive\nz\n";
    let map = split_sections(text);
    assert_eq!(
        map.labels(),
        &[
            "3 Overview".to_string(),
            "3.2 Detail".to_string(),
            "3.2.1 Deep dive".to_string()
        ]
    );
}

#[test]
fn lines_before_first_heading_go_to_preface() {
    let text = "title page\nauthor list\n1 Intro\nHello\n";
    let map = split_sections(text);
    assert_eq!(map.labels()[0], PREFACE_LABEL);
    assert_eq!(map.text(PREFACE_LABEL), Some("title page\nauthor list\n"));
    assert_eq!(map.text("1 Intro"), Some("1 Intro\nHello\n"));
}

#[test]
fn no_heading_yields_single_preface_bucket() {
    let text = "just text\nmore text\n";
    let map = split_sections(text);
    assert_eq!(map.len(), 1);
    assert_eq!(map.text(PREFACE_LABEL), Some(text));
}

#[test]
fn empty_text_degrades_to_empty_preface_bucket() {
    let map = split_sections("");
    assert_eq!(map.labels(), &[PREFACE_LABEL.to_string()]);
    assert_eq!(map.text(PREFACE_LABEL), Some(""));
}

#[test]
fn repeated_label_accumulates_into_same_bucket() {
    let text = "1 Intro\nfirst\n1 Intro\nsecond\n";
    let map = split_sections(text);
    assert_eq!(map.len(), 1);
    assert_eq!(map.text("1 Intro"), Some("1 Intro\nfirst\n1 Intro\nsecond\n"));
}

#[test]
fn concatenated_buckets_reconstruct_input_exactly() {
    // includes a final line without trailing newline and a malformed heading
    let text = "preamble\n1 Intro\nHello\n12.\nnot a heading\n2 Body\nlast line";
    let map = split_sections(text);
    let rebuilt: String = map.iter().map(|(_, t)| t).collect();
    assert_eq!(rebuilt, text);
}

#[test]
fn heading_requires_title_after_number() {
    // a bare number is body text, not a heading
    let text = "1 Intro\n42\nstill intro\n";
    let map = split_sections(text);
    assert_eq!(map.len(), 1);
    assert_eq!(map.text("1 Intro"), Some(text));
}
