use tantivy::tokenizer::{LowerCaser, RemoveLongFilter, SimpleTokenizer, StopWordFilter, TextAnalyzer, TokenStream};

const STOP_WORDS: &[&str] = &[
	"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
];

/// Tokens longer than this are dropped (base64 blobs, hashes).
const MAX_TOKEN_LEN: usize = 40;

/// Shared tokenization for indexing and querying: split on non-alphanumerics,
/// lowercase, drop stop words and single letters. Digits always survive so
/// exit codes like `137` or `1` stay searchable.
#[derive(Clone)]
pub struct Analyzer {
	inner: TextAnalyzer,
}

impl Default for Analyzer {
	fn default() -> Self {
		let inner = TextAnalyzer::builder(SimpleTokenizer::default())
			.filter(RemoveLongFilter::limit(MAX_TOKEN_LEN))
			.filter(LowerCaser)
			.filter(StopWordFilter::remove(STOP_WORDS.iter().map(|s| s.to_string())))
			.build();
		Self { inner }
	}
}

impl std::fmt::Debug for Analyzer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Analyzer").finish_non_exhaustive()
	}
}

impl Analyzer {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn tokenize(&self, text: &str) -> Vec<String> {
		// token_stream needs &mut; the analyzer clone is a boxed pipeline copy.
		let mut analyzer = self.inner.clone();
		let mut stream = analyzer.token_stream(text);
		let mut tokens = Vec::new();
		while stream.advance() {
			let token = &stream.token().text;
			if token.chars().count() > 1 || token.chars().all(|c| c.is_ascii_digit()) {
				tokens.push(token.clone());
			}
		}
		tokens
	}
}
