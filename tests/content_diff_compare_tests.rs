use draftproof::{compare_documents, content_diff, ChangeKind};

#[test]
fn diff_of_identical_sequences_is_empty() {
    let lines = ["alpha", "beta", "gamma"];
    assert!(content_diff(&lines, &lines).is_empty());
}

#[test]
fn diff_keeps_only_changed_lines() {
    let base = ["1 Intro", "Hello"];
    let draft = ["1 Intro", "Hello there"];
    let diff = content_diff(&base, &draft);
    assert_eq!(diff.len(), 2);
    assert_eq!(diff[0].kind, ChangeKind::Removed);
    assert_eq!(diff[0].line, "Hello");
    assert_eq!(diff[1].kind, ChangeKind::Added);
    assert_eq!(diff[1].line, "Hello there");
}

#[test]
fn diff_markers_mirror_when_sides_swap() {
    let a = ["alpha", "beta", "gamma"];
    let b = ["alpha", "delta", "gamma"];
    let forward = content_diff(&a, &b);
    let backward = content_diff(&b, &a);

    let forward_added: Vec<&str> = forward
        .iter()
        .filter(|d| d.kind == ChangeKind::Added)
        .map(|d| d.line.as_str())
        .collect();
    let backward_removed: Vec<&str> = backward
        .iter()
        .filter(|d| d.kind == ChangeKind::Removed)
        .map(|d| d.line.as_str())
        .collect();
    assert_eq!(forward_added, backward_removed);
}

#[test]
fn diff_against_empty_side_is_all_one_kind() {
    let lines = ["x", "y"];
    let all_added = content_diff(&[], &lines);
    assert!(all_added.iter().all(|d| d.kind == ChangeKind::Added));
    assert_eq!(all_added.len(), 2);

    let all_removed = content_diff(&lines, &[]);
    assert!(all_removed.iter().all(|d| d.kind == ChangeKind::Removed));
    assert_eq!(all_removed.len(), 2);
}

#[test]
fn compare_reports_per_section_changes() {
    let baseline = "1 Intro\nHello\n2 Body\nWorld\n";
    let draft = "1 Intro\nHello there\n2 Body\nWorld\n";
    let report = compare_documents(baseline, draft, 0.8);

    assert_eq!(report.matched, 2);
    assert_eq!(report.removed_sections, 0);
    assert_eq!(report.added_sections, 0);

    assert_eq!(report.sections[0].label, "1 Intro");
    assert_eq!(report.sections[0].diff.len(), 2);
    assert_eq!(report.sections[1].label, "2 Body");
    assert!(report.sections[1].diff.is_empty());
    assert_eq!(report.sections[1].similarity, 1.0);

    assert_eq!(report.records.len(), 2);
    assert_eq!(report.records[0].chapter, "1 Intro");
    assert_eq!(report.records[0].kind, ChangeKind::Removed);
    assert_eq!(report.records[0].content, "Hello");
    assert_eq!(report.records[1].kind, ChangeKind::Added);
    assert_eq!(report.records[1].content, "Hello there");
}

#[test]
fn section_similarity_is_rounded_to_two_decimals() {
    let baseline = "1 Intro\nHello\n2 Body\nWorld\n";
    let draft = "1 Intro\nHello there\n2 Body\nWorld\n";
    let report = compare_documents(baseline, draft, 0.8);
    // 2*14/34 = 0.8235... -> 0.82
    assert!((report.sections[0].similarity - 0.82).abs() < 1e-9);
    assert!((report.records[0].similarity - 0.82).abs() < 1e-9);
}

#[test]
fn renamed_section_is_paired_not_removed_plus_added() {
    let body = "All personnel must wear protective equipment at all times while on the floor.\nEmergency exits are marked in green.\n";
    let baseline = format!("3 Safety\n{}", body);
    let draft = format!("3 Safety Procedures\n{}", body);
    let report = compare_documents(&baseline, &draft, 0.8);

    assert_eq!(report.matched, 1);
    assert_eq!(report.removed_sections, 0);
    assert_eq!(report.added_sections, 0);
    assert_eq!(report.sections[0].label, "3 Safety Procedures");
    assert_eq!(report.sections[0].baseline_label.as_deref(), Some("3 Safety"));
    assert!(report.sections[0].similarity > 0.8);
    // only the heading line changed
    assert_eq!(report.sections[0].diff.len(), 2);
    assert_eq!(report.sections[0].diff[0].line, "3 Safety");
    assert_eq!(report.sections[0].diff[1].line, "3 Safety Procedures");
}

#[test]
fn unmatched_sections_become_all_removed_and_all_added() {
    let baseline = "1 Intro\nH\n9 Old\ncompletely different content zzz\n";
    let draft = "1 Intro\nH\n5 New\nfresh added material qqq\n";
    let report = compare_documents(baseline, draft, 0.8);

    assert_eq!(report.matched, 1);
    assert_eq!(report.removed_sections, 1);
    assert_eq!(report.added_sections, 1);

    // matched pairs and removed baseline sections first, then added drafts
    let removed: Vec<&str> = report
        .records
        .iter()
        .filter(|r| r.chapter == "9 Old")
        .map(|r| r.content.as_str())
        .collect();
    assert_eq!(removed, vec!["9 Old", "completely different content zzz"]);
    assert!(report
        .records
        .iter()
        .filter(|r| r.chapter == "9 Old")
        .all(|r| r.kind == ChangeKind::Removed && r.similarity == 0.0));

    let added: Vec<&str> = report
        .records
        .iter()
        .filter(|r| r.chapter == "5 New")
        .map(|r| r.content.as_str())
        .collect();
    assert_eq!(added, vec!["5 New", "fresh added material qqq"]);
    let last = report.records.last().expect("records present");
    assert_eq!(last.chapter, "5 New");
    assert_eq!(last.kind, ChangeKind::Added);
}

#[test]
fn section_diffs_render_with_markers_in_order() {
    let baseline = "1 Intro\nHello\n2 Body\nWorld\n";
    let draft = "1 Intro\nHello there\n2 Body\nWorld\n";
    let report = compare_documents(baseline, draft, 0.8);
    let diffs = report.section_diffs();
    assert_eq!(diffs[0].0, "1 Intro");
    assert_eq!(diffs[0].1, "- Hello\n+ Hello there\n");
    assert_eq!(diffs[1].0, "2 Body");
    assert_eq!(diffs[1].1, "");
}
