use runbook_core::chunker::{count_tokens, Chunker, ChunkingConfig};
use runbook_core::types::{Document, SourceType};

fn doc(id: &str, content: &str) -> Document {
    Document::new(id, SourceType::Docs, "k8s", "https://docs.example.com/x", "Title", content)
}

fn unmerged() -> Chunker {
    Chunker::new(ChunkingConfig { min_tokens: 0, ..ChunkingConfig::default() })
}

#[test]
fn count_tokens_rounds_up_words_over_three_quarters() {
    assert_eq!(count_tokens(""), 0);
    assert_eq!(count_tokens("one"), 2);
    assert_eq!(count_tokens("a b c"), 4);
    assert_eq!(count_tokens("  spaced   out\nwords "), 4);
}

#[test]
fn empty_document_has_no_chunks() {
    let chunks = Chunker::default().chunk(&doc("empty", "   \n\n  "));
    assert!(chunks.is_empty());
}

#[test]
fn sections_follow_heading_paths() {
    let content = "# Disk Pressure\n\nNode reports DiskPressure.\n\n## Remediation\n\nRun `crictl rmi --prune` to clean images.\n";
    let chunks = unmerged().chunk(&doc("dp", content));

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].heading_path, vec!["Disk Pressure".to_string()]);
    assert_eq!(chunks[1].heading_path, vec!["Disk Pressure".to_string(), "Remediation".to_string()]);
    assert_eq!(chunks[0].chunk_index, 0);
    assert_eq!(chunks[1].chunk_index, 1);
    assert!(chunks[1].text.starts_with("Remediation"));
    assert!(chunks[1].text.contains("crictl rmi --prune"), "inline code keeps its content");
}

#[test]
fn small_sections_merge_into_the_next_one() {
    let content = "# Disk Pressure\n\nNode reports DiskPressure.\n\n## Remediation\n\nPrune unused images.\n";
    let chunks = Chunker::default().chunk(&doc("dp", content));

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].heading_path, vec!["Disk Pressure".to_string(), "Remediation".to_string()]);
    assert!(chunks[0].text.contains("Node reports DiskPressure."));
    assert!(chunks[0].text.contains("Prune unused images."));
}

#[test]
fn oversized_section_splits_with_overlap() {
    let words: Vec<String> = (0..1000).map(|i| format!("w{i}")).collect();
    let content = words.join(" ");
    let chunks = Chunker::default().chunk(&doc("big", &content));

    assert!(chunks.len() >= 3, "1000 words cannot fit in fewer than 3 windows");
    for chunk in &chunks {
        assert!(chunk.token_count <= 400, "chunk of {} tokens", chunk.token_count);
    }
    for pair in chunks.windows(2) {
        let first_of_next = pair[1].text.split_whitespace().next().unwrap();
        assert!(pair[0].text.split_whitespace().any(|w| w == first_of_next), "consecutive windows overlap");
    }
    let last = chunks.last().unwrap();
    assert!(last.text.ends_with("w999"));
}

#[test]
fn split_prefers_sentence_boundaries() {
    let mut words: Vec<String> = (0..500).map(|i| format!("w{i}")).collect();
    words[250] = "w250.".to_string();
    let chunks = Chunker::default().chunk(&doc("sentences", &words.join(" ")));

    assert!(chunks[0].text.ends_with("w250."));
}

#[test]
fn chunk_ids_are_stable_and_prefixed_by_document() {
    let content = "# Restart\n\nRestart the kubelet service.\n";
    let a = Chunker::default().chunk(&doc("runbook-1", content));
    let b = Chunker::default().chunk(&doc("runbook-1", content));

    assert_eq!(a, b);
    assert!(a[0].chunk_id.starts_with("runbook-1#"));
    assert_eq!(a[0].chunk_id.len(), "runbook-1#".len() + 16);
    assert_eq!(a[0].document_id, "runbook-1");
    assert!(a[0].chunk_id.ends_with(&a[0].content_hash[..16]));
}

#[test]
fn identical_chunks_within_a_document_are_kept_once() {
    let content = "## Step\n\nrestart kubelet\n\n## Step\n\nrestart kubelet\n";
    let chunks = unmerged().chunk(&doc("dup", content));

    assert_eq!(chunks.len(), 1);
}

#[test]
fn headings_inside_code_fences_are_code() {
    let content = "# Title\n\n```bash\n# not a heading\nkubectl get pods\n```\n";
    let chunks = unmerged().chunk(&doc("fence", content));

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].heading_path, vec!["Title".to_string()]);
    assert!(chunks[0].text.contains("# not a heading"));
    assert!(!chunks[0].text.contains("```"));
}

#[test]
fn front_matter_is_not_indexed() {
    let content = "---\ntitle: Evictions\nowner: sre\n---\n# Evictions\n\nPods evicted under memory pressure.\n";
    let chunks = unmerged().chunk(&doc("fm", content));

    assert_eq!(chunks.len(), 1);
    assert!(!chunks[0].text.contains("owner"));
}

#[test]
fn fingerprint_tracks_the_policy() {
    let a = ChunkingConfig::default();
    let b = ChunkingConfig { max_tokens: 512, ..ChunkingConfig::default() };
    assert_ne!(a.fingerprint(), b.fingerprint());
    assert_eq!(a.fingerprint(), ChunkingConfig::default().fingerprint());
}
