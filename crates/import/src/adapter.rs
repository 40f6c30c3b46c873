use tallyfeed_core::CanonicalTransaction;

/// Turns one source-specific transaction record into a ledger record.
pub trait SourceAdapter {
    type Raw;

    fn normalize(&self, raw: &Self::Raw) -> CanonicalTransaction;

    fn normalize_all<'r, I>(&self, raws: I) -> Vec<CanonicalTransaction>
    where
        I: IntoIterator<Item = &'r Self::Raw>,
        Self::Raw: 'r,
    {
        raws.into_iter().map(|raw| self.normalize(raw)).collect()
    }
}
