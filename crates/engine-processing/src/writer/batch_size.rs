/// Rows per write call for a table receiving `total` mutations.
pub fn batch_size_for(total: usize) -> usize {
    match total {
        0..=100 => 20,
        101..=500 => 30,
        _ => 50,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds() {
        assert_eq!(batch_size_for(1), 20);
        assert_eq!(batch_size_for(100), 20);
        assert_eq!(batch_size_for(101), 30);
        assert_eq!(batch_size_for(500), 30);
        assert_eq!(batch_size_for(501), 50);
        assert_eq!(batch_size_for(10_000), 50);
    }
}
