use std::collections::{BTreeMap, HashMap};

/// Resolves the symbol defined at an address, if any.
pub trait SymbolLookup {
    fn symbol_at(&self, address: u64) -> Option<&str>;
}

impl SymbolLookup for HashMap<u64, String> {
    fn symbol_at(&self, address: u64) -> Option<&str> {
        self.get(&address).map(String::as_str)
    }
}

impl SymbolLookup for BTreeMap<u64, String> {
    fn symbol_at(&self, address: u64) -> Option<&str> {
        self.get(&address).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_exact_address() {
        let mut symbols = HashMap::new();
        symbols.insert(0x1000u64, "_main".to_string());
        assert_eq!(symbols.symbol_at(0x1000), Some("_main"));
        assert_eq!(symbols.symbol_at(0x1008), None);

        let symbols: BTreeMap<u64, String> = symbols.into_iter().collect();
        assert_eq!(symbols.symbol_at(0x1000), Some("_main"));
    }
}
