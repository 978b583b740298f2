mod decoder;
mod bit_reader;
mod lzw;

pub use decoder::Decoder;

#[repr(u8)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum DisposalMethod {
    #[default]
    Unspecified = 0,
    DoNotDispose = 1,
    RestoreToBackgroundColor = 2,
    RestoreToPrevious = 3,
}

impl DisposalMethod {
    pub(crate) fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(DisposalMethod::Unspecified),
            1 => Some(DisposalMethod::DoNotDispose),
            2 => Some(DisposalMethod::RestoreToBackgroundColor),
            3 => Some(DisposalMethod::RestoreToPrevious),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DisposalMethod;

    #[test]
    fn disposal_codes() {
        assert_eq!(DisposalMethod::from_u8(0), Some(DisposalMethod::Unspecified));
        assert_eq!(DisposalMethod::from_u8(2), Some(DisposalMethod::RestoreToBackgroundColor));
        assert_eq!(DisposalMethod::from_u8(3), Some(DisposalMethod::RestoreToPrevious));
        assert_eq!(DisposalMethod::from_u8(5), None);
        assert_eq!(DisposalMethod::from_u8(5).unwrap_or_default(), DisposalMethod::Unspecified);
    }
}
