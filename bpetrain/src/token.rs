/// A token in its integer form, which is also its id in the vocabulary.
///
/// During training the same integer space is used for the symbols that make up a pretoken: the
/// ids 0-255 are the raw bytes, and every merge allocates the next id.  A symbol and the token it
/// eventually becomes in the vocabulary are therefore the same number.
pub type TokenInt = usize;

/// A token in its byte string form.
///
/// Tokens are not guaranteed to be valid UTF-8, since merges are learned over bytes and can split
/// multi-byte code points.
pub type TokenString = Vec<u8>;

/// Two adjacent symbols within a pretoken, `(left, right)`.
pub type Pair = (TokenInt, TokenInt);

/// Number of single-byte tokens that every vocabulary starts with.
pub const BYTE_TOKEN_COUNT: usize = 256;
