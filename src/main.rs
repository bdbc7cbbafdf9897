use std::fs;
use std::path::Path;

use draftproof::{
    check_custom_rules, check_deps, compare_documents, emit_report, install_help_for,
    render_report_markdown, sha256_hex, summary_csv, validate_checklist, validate_config,
    ChecklistResult, DepsResult, ExtractError, GrammarChecker, GrammarError, GrammarSuggestion,
    LanguageToolChecker, PopplerExtractor, RuleFinding, TextExtractor,
};

fn main() {
    // Simple CLI flags parsing
    let args: Vec<String> = std::env::args().collect();
    let strict = args.iter().any(|a| a == "--strict");
    let mut config_path = String::from("review.yaml");
    if let Some(pos) = args.iter().position(|a| a == "--config") {
        if let Some(val) = args.get(pos + 1) {
            if !val.starts_with("--") {
                config_path = val.clone();
            }
        }
    }
    let mut threshold_override: Option<f64> = None;
    if let Some(pos) = args.iter().position(|a| a == "--threshold") {
        if let Some(val) = args.get(pos + 1) {
            if let Ok(t) = val.parse::<f64>() {
                threshold_override = Some(t.clamp(0.0, 1.0));
            }
        }
    }
    // Grammar flag supports: --with-grammar, --with-grammar=on, --with-grammar=off
    let mut with_grammar_forced: Option<bool> = None;
    if let Some(pos) = args.iter().position(|a| a.starts_with("--with-grammar")) {
        let val = &args[pos];
        if val == "--with-grammar" || val == "--with-grammar=on" {
            with_grammar_forced = Some(true);
        } else if val == "--with-grammar=off" {
            with_grammar_forced = Some(false);
        }
    }

    fn slugify(base: &str) -> String {
        let lower = base.to_lowercase();
        let mut s = String::with_capacity(lower.len());
        for ch in lower.chars() {
            if ch.is_ascii_alphanumeric() {
                s.push(ch);
            } else {
                s.push('-');
            }
        }
        let trimmed = s.trim_matches('-').to_string();
        let mut collapsed = String::with_capacity(trimmed.len());
        let mut prev_dash = false;
        for ch in trimmed.chars() {
            if ch == '-' {
                if !prev_dash {
                    collapsed.push(ch);
                }
                prev_dash = true;
            } else {
                prev_dash = false;
                collapsed.push(ch);
            }
        }
        if collapsed.is_empty() {
            "review".to_string()
        } else {
            collapsed
        }
    }

    // 1) Read and validate review.yaml
    let cfg = match validate_config(Path::new(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::json!({
                    "tool": "validate_config",
                    "file": config_path,
                    "error": e.to_string()
                })
            );
            std::process::exit(3);
        }
    };
    let threshold = threshold_override.unwrap_or(cfg.match_threshold());
    let grammar_on = with_grammar_forced.unwrap_or(cfg.grammar_enabled());

    eprintln!(
        "{}",
        serde_json::json!({
            "tool": "validate_config",
            "file": config_path,
            "status": "ok",
            "baseline": cfg.inputs.baseline,
            "draft": cfg.inputs.draft,
            "threshold": threshold,
            "output_dir": cfg.output_dir()
        })
    );

    // 2) check_deps
    let deps: DepsResult = check_deps();
    if !deps.ok {
        eprintln!(
            "{}",
            serde_json::json!({
                "tool": "check_deps",
                "missing": deps.missing,
                "error_code": 2
            })
        );
        let help = install_help_for(&deps.missing);
        if !help.is_empty() {
            eprintln!("{}", help);
        }
        std::process::exit(2);
    } else {
        eprintln!(
            "{}",
            serde_json::json!({
                "tool": "check_deps",
                "status": "ok",
                "missing": deps.missing
            })
        );
        if !deps.missing.is_empty() {
            let help = install_help_for(&deps.missing);
            if !help.is_empty() {
                eprintln!("{}", help);
            }
        }
    }

    let started_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i128)
        .unwrap_or(0);

    // 3) Extract both documents
    let extractor = PopplerExtractor::default();
    let extract = |which: &str, path: &str| -> String {
        match extractor.extract(Path::new(path)) {
            Ok(text) => {
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "tool": "extract_text",
                        "input": which,
                        "file": path,
                        "lines": text.lines().count(),
                        "chars": text.chars().count()
                    })
                );
                text
            }
            Err(err) => {
                let label = match err {
                    ExtractError::FileNotFound(_) => "FileNotFound",
                    ExtractError::EncryptedPdf(_) => "EncryptedPdf",
                    ExtractError::Other(_) => "ExtractError",
                };
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "tool": "extract_text",
                        "input": which,
                        "file": path,
                        "error": label,
                        "error_code": 1
                    })
                );
                std::process::exit(1);
            }
        }
    };
    let baseline_text = extract("baseline", &cfg.inputs.baseline);
    let draft_text = extract("draft", &cfg.inputs.draft);

    // 4) Chapter-aware comparison
    let report = compare_documents(&baseline_text, &draft_text, threshold);
    eprintln!(
        "{}",
        serde_json::json!({
            "tool": "compare_documents",
            "matched": report.matched,
            "removed_sections": report.removed_sections,
            "added_sections": report.added_sections,
            "records": report.records.len()
        })
    );

    // 5) Checklist validation (optional stage)
    let mut checklist_results: Vec<ChecklistResult> = Vec::new();
    match &cfg.checklist {
        Some(path) => match fs::read_to_string(path) {
            Ok(content) => {
                let items: Vec<String> = content
                    .lines()
                    .map(|l| l.trim().to_string())
                    .filter(|l| !l.is_empty())
                    .collect();
                checklist_results = validate_checklist(&draft_text, &items);
                let failed = checklist_results.iter().filter(|r| !r.passed).count();
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "tool": "validate_checklist",
                        "file": path,
                        "items": checklist_results.len(),
                        "failed": failed
                    })
                );
            }
            Err(e) => {
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "tool": "validate_checklist",
                        "file": path,
                        "skipped": true,
                        "error": e.to_string()
                    })
                );
            }
        },
        None => {
            eprintln!(
                "{}",
                serde_json::json!({"tool": "validate_checklist", "skipped": true})
            );
        }
    }

    // 6) Style rules (optional stage)
    let mut findings: Vec<RuleFinding> = Vec::new();
    match &cfg.rules {
        Some(path) => match fs::read_to_string(path) {
            Ok(content) => {
                let rules: Vec<String> = content
                    .lines()
                    .map(|l| l.trim().to_string())
                    .filter(|l| !l.is_empty())
                    .collect();
                findings = check_custom_rules(&draft_text, &rules);
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "tool": "check_custom_rules",
                        "file": path,
                        "rules": rules.len(),
                        "findings": findings.len()
                    })
                );
            }
            Err(e) => {
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "tool": "check_custom_rules",
                        "file": path,
                        "skipped": true,
                        "error": e.to_string()
                    })
                );
            }
        },
        None => {
            eprintln!(
                "{}",
                serde_json::json!({"tool": "check_custom_rules", "skipped": true})
            );
        }
    }

    // 7) Grammar suggestions (optional stage, degrades when the tool is absent)
    let mut suggestions: Vec<GrammarSuggestion> = Vec::new();
    let mut grammar_skipped_reason: Option<String> = None;
    if grammar_on {
        let checker = LanguageToolChecker::new(cfg.grammar_lang());
        match checker.check(&draft_text) {
            Ok(s) => {
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "tool": "grammar_check",
                        "lang": cfg.grammar_lang(),
                        "suggestions": s.len(),
                        "shown": s.len().min(cfg.max_suggestions())
                    })
                );
                suggestions = s;
            }
            Err(GrammarError::ToolMissing(tool)) => {
                let reason = format!("{}_missing", tool);
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "tool": "grammar_check",
                        "skipped": true,
                        "reason": reason
                    })
                );
                grammar_skipped_reason = Some(reason);
            }
            Err(e) => {
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "tool": "grammar_check",
                        "skipped": true,
                        "error": e.to_string()
                    })
                );
                grammar_skipped_reason = Some(e.to_string());
            }
        }
    } else {
        grammar_skipped_reason = Some("disabled".to_string());
        eprintln!(
            "{}",
            serde_json::json!({"tool": "grammar_check", "skipped": true, "reason": "disabled"})
        );
    }

    // 8) Emit report files (atomic)
    let finished_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i128)
        .unwrap_or(0);
    let doc_id = slugify(&cfg.id);
    let checklist_failed = checklist_results.iter().filter(|r| !r.passed).count();

    let meta = serde_json::json!({
        "doc_id": doc_id,
        "engine": "poppler",
        "threshold": threshold,
        "sections": {
            "matched": report.matched,
            "removed": report.removed_sections,
            "added": report.added_sections
        },
        "records": report.records.len(),
        "checklist": {
            "evaluated": checklist_results.len(),
            "failed": checklist_failed
        },
        "rule_findings": findings.len(),
        "grammar": {
            "enabled": grammar_on,
            "suggestions": suggestions.len(),
            "skipped_reason": grammar_skipped_reason,
            "display_limit": cfg.max_suggestions()
        },
        "timestamps": {"started_ms": started_ms, "finished_ms": finished_ms},
    });
    // Compute meta_fingerprint (normalized meta without timestamps)
    let mut meta_norm = meta.clone();
    if let Some(obj) = meta_norm.as_object_mut() {
        obj.remove("timestamps");
    }
    let meta_norm_bytes = serde_json::to_vec(&meta_norm).unwrap_or_default();
    let fingerprint = sha256_hex(&meta_norm_bytes);
    let mut meta_full = meta.as_object().cloned().unwrap_or_default();
    meta_full.insert("meta_fingerprint".to_string(), serde_json::json!(fingerprint));
    let meta = serde_json::Value::Object(meta_full);

    let report_md = render_report_markdown(
        &report,
        &checklist_results,
        &findings,
        &suggestions,
        cfg.max_suggestions(),
    );
    let summary = summary_csv(&report.records);
    match emit_report(&report_md, &summary, &meta, cfg.output_dir().as_str(), &doc_id) {
        Ok(paths) => {
            eprintln!(
                "{}",
                serde_json::json!({
                    "tool": "emit_report",
                    "report_path": paths.report_path,
                    "summary_path": paths.summary_path,
                    "meta_path": paths.meta_path
                })
            );
        }
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::json!({
                    "tool": "emit_report",
                    "error": e.to_string(),
                    "error_code": 6
                })
            );
            std::process::exit(6);
        }
    }

    // Strict mode: failing checklist items fail the run, after emitting so
    // the report stays available for inspection
    if strict && checklist_failed > 0 {
        eprintln!(
            "{}",
            serde_json::json!({
                "tool": "validate_checklist",
                "error": "ChecklistFailed",
                "failed": checklist_failed,
                "error_code": 5
            })
        );
        std::process::exit(5);
    }
}
