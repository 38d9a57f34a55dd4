/// Options accepted by [`crate::Object::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOption {
    /// Inclusive byte range. `start: None` asks for the last `end` bytes,
    /// `end: None` reads to the end of the object.
    Range { start: Option<u64>, end: Option<u64> },
    /// Read from this offset to the end.
    Seek(u64),
}

impl OpenOption {
    pub fn range(start: u64, end: Option<u64>) -> Self {
        OpenOption::Range {
            start: Some(start),
            end,
        }
    }

    pub fn suffix(len: u64) -> Self {
        OpenOption::Range {
            start: None,
            end: Some(len),
        }
    }

    /// Rewrites the option as an absolute range within an object of `size`
    /// bytes, clamping the end to the last byte.
    pub fn fix_range(self, size: u64) -> Self {
        let last = size.checked_sub(1);
        match self {
            OpenOption::Seek(offset) => OpenOption::Range {
                start: Some(offset),
                end: None,
            },
            OpenOption::Range {
                start: None,
                end: Some(len),
            } => OpenOption::Range {
                start: Some(size.saturating_sub(len)),
                end: last,
            },
            OpenOption::Range {
                start,
                end: Some(end),
            } => OpenOption::Range {
                start,
                end: Some(last.map_or(end, |last| end.min(last))),
            },
            other => other,
        }
    }

    /// `Range` header value, or `None` when the whole object is wanted.
    pub fn header(&self) -> Option<String> {
        match *self {
            OpenOption::Seek(0) => None,
            OpenOption::Seek(offset) => Some(format!("bytes={offset}-")),
            OpenOption::Range {
                start: None | Some(0),
                end: None,
            } => None,
            OpenOption::Range {
                start: Some(start),
                end: None,
            } => Some(format!("bytes={start}-")),
            OpenOption::Range {
                start: None,
                end: Some(len),
            } => Some(format!("bytes=-{len}")),
            OpenOption::Range {
                start: Some(start),
                end: Some(end),
            } => Some(format!("bytes={start}-{end}")),
        }
    }
}

/// Header for the last range-like option, normalized against `size` when the
/// size is known.
pub fn range_header(options: &[OpenOption], size: Option<u64>) -> Option<String> {
    let option = options.last()?;
    match size {
        Some(size) => option.fix_range(size).header(),
        None => option.header(),
    }
}
