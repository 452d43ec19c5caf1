//! The learned vocabulary: the mapping between token ids and the byte sequences they stand for,
//! plus the merge rules that produced it.
use crate::hash::HashMap;
use crate::token::{TokenInt, TokenString, BYTE_TOKEN_COUNT};

/// Maps byte sequences to the id of the token they correspond to.
#[derive(Clone, Debug, Default)]
pub struct TokenEncoder(HashMap<TokenString, TokenInt>);

impl TokenEncoder {
    /// Build the lookup from token strings listed in id order.
    ///
    /// If a byte sequence appears more than once (for example a special token that is a single
    /// byte), the lowest id wins.
    fn from_tokens(tokens: &[TokenString]) -> Self {
        let mut map = HashMap::with_capacity_and_hasher(tokens.len(), Default::default());
        for (id, bytes) in tokens.iter().enumerate() {
            map.entry(bytes.clone()).or_insert(id);
        }
        Self(map)
    }

    pub fn token_for_bytes(&self, bytes: impl AsRef<[u8]>) -> Option<TokenInt> {
        self.0.get(bytes.as_ref()).copied()
    }
}

/// One learned merge: every adjacent occurrence of `left` followed by `right` becomes `token`.
///
/// The position of a rule in the merge list is significant; encoders must apply the rules in the
/// order they were learned.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct MergeRule {
    pub left: TokenInt,
    pub right: TokenInt,
    pub token: TokenInt,
}

impl MergeRule {
    /// Apply this rule to a symbol sequence, replacing non-overlapping occurrences of the pair
    /// from left to right.
    ///
    /// Runs of identical symbols merge pairwise from the left, so `a a a` with the rule `(a, a)`
    /// becomes `aa a`, not `a aa`.
    pub fn apply(&self, symbols: &[TokenInt]) -> Vec<TokenInt> {
        let mut merged = Vec::with_capacity(symbols.len());
        let mut i = 0;
        while i < symbols.len() {
            if i + 1 < symbols.len() && symbols[i] == self.left && symbols[i + 1] == self.right {
                merged.push(self.token);
                i += 2;
            } else {
                merged.push(symbols[i]);
                i += 1;
            }
        }
        merged
    }
}

/// Assembles a vocabulary in its fixed order: the 256 single bytes, then the special tokens in the
/// order given, then one token per merge in the order the merges are learned.
#[derive(Clone, Debug)]
pub struct VocabularyBuilder {
    tokens: Vec<TokenString>,
    special_token_count: usize,
}

impl VocabularyBuilder {
    pub fn new<S: AsRef<str>>(special_tokens: &[S]) -> Self {
        let mut tokens = Vec::with_capacity(BYTE_TOKEN_COUNT + special_tokens.len());
        tokens.extend((0..=u8::MAX).map(|byte| vec![byte]));
        tokens.extend(
            special_tokens
                .iter()
                .map(|token| token.as_ref().as_bytes().to_vec()),
        );

        Self {
            tokens,
            special_token_count: special_tokens.len(),
        }
    }

    /// Add the token produced by merging `left` and `right`, returning its id.
    ///
    /// # Panics
    ///
    /// If either id is not already in the vocabulary.
    pub fn push_merge(&mut self, left: TokenInt, right: TokenInt) -> TokenInt {
        let mut bytes = Vec::with_capacity(self.tokens[left].len() + self.tokens[right].len());
        bytes.extend_from_slice(&self.tokens[left]);
        bytes.extend_from_slice(&self.tokens[right]);

        self.tokens.push(bytes);
        self.tokens.len() - 1
    }

    pub fn bytes_for_token(&self, token: TokenInt) -> Option<&[u8]> {
        self.tokens.get(token).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn special_token_count(&self) -> usize {
        self.special_token_count
    }

    pub fn build(self) -> Vocabulary {
        Vocabulary::from_tokens(self.tokens)
    }
}

/// The final, read-only vocabulary, with lookups in both directions.
#[derive(Clone, Debug)]
pub struct Vocabulary {
    /// Token byte strings, indexed by id
    tokens: Vec<TokenString>,

    encoder: TokenEncoder,
}

impl Vocabulary {
    /// Make a vocabulary from byte strings listed in id order.
    pub fn from_tokens(tokens: Vec<TokenString>) -> Self {
        let encoder = TokenEncoder::from_tokens(&tokens);
        Self { tokens, encoder }
    }

    pub fn bytes_for_token(&self, token: TokenInt) -> Option<&[u8]> {
        self.tokens.get(token).map(Vec::as_slice)
    }

    pub fn token_for_bytes(&self, bytes: impl AsRef<[u8]>) -> Option<TokenInt> {
        self.encoder.token_for_bytes(bytes)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// All tokens with their ids, in id order.
    pub fn iter(&self) -> impl Iterator<Item = (TokenInt, &[u8])> {
        self.tokens
            .iter()
            .enumerate()
            .map(|(id, bytes)| (id, bytes.as_slice()))
    }

    /// The token byte strings, indexed by id.
    pub fn tokens(&self) -> &[TokenString] {
        &self.tokens
    }
}

impl PartialEq for Vocabulary {
    fn eq(&self, other: &Self) -> bool {
        // The encoder is derived from the tokens
        self.tokens == other.tokens
    }
}

impl Eq for Vocabulary {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_layout() {
        let mut builder = VocabularyBuilder::new(&["<|endoftext|>", "<|pad|>"]);
        assert_eq!(258, builder.len());
        assert_eq!(2, builder.special_token_count());

        let lo = builder.push_merge(b'l' as TokenInt, b'o' as TokenInt);
        let low = builder.push_merge(lo, b'w' as TokenInt);
        assert_eq!(258, lo);
        assert_eq!(259, low);

        let vocab = builder.build();
        assert_eq!(260, vocab.len());
        assert_eq!(Some(&b"A"[..]), vocab.bytes_for_token(65));
        assert_eq!(Some(&b"<|endoftext|>"[..]), vocab.bytes_for_token(256));
        assert_eq!(Some(&b"<|pad|>"[..]), vocab.bytes_for_token(257));
        assert_eq!(Some(&b"low"[..]), vocab.bytes_for_token(259));
        assert_eq!(None, vocab.bytes_for_token(260));

        assert_eq!(Some(259), vocab.token_for_bytes("low"));
        assert_eq!(Some(257), vocab.token_for_bytes("<|pad|>"));
        assert_eq!(Some(0), vocab.token_for_bytes([0u8]));
        assert_eq!(None, vocab.token_for_bytes("lo w"));
    }

    #[test]
    fn duplicate_bytes_resolve_to_lowest_id() {
        let vocab = VocabularyBuilder::new(&["!"]).build();
        assert_eq!(Some(&b"!"[..]), vocab.bytes_for_token(256));
        assert_eq!(Some(b'!' as TokenInt), vocab.token_for_bytes("!"));
    }

    #[test]
    fn apply_merges_left_to_right() {
        let rule = MergeRule {
            left: 1,
            right: 1,
            token: 9,
        };
        assert_eq!(vec![9, 1], rule.apply(&[1, 1, 1]));
        assert_eq!(vec![9, 9], rule.apply(&[1, 1, 1, 1]));
        assert_eq!(vec![2, 9, 3, 1], rule.apply(&[2, 1, 1, 3, 1]));
        assert!(rule.apply(&[]).is_empty());
    }
}
