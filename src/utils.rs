#[cfg(feature = "serde")]
use crate::engine::TapeRecord;

// [
//   {"id": 1, "price": 124499.99, "volume": 0.2, "time": 1759813200000, "side": "buy"},
//   {"id": 2, "price": 124501.10, "volume": 0.05, "time": 1759813201000, "side": "sell"}
// ]

#[cfg(feature = "serde")]
/// Reads a JSON trade tape from `filepath`.
///
/// The records do not need to be sorted; the engine orders them by time then id.
pub fn read_tape(filepath: impl AsRef<std::path::Path>) -> crate::errors::Result<Vec<TapeRecord>> {
    use crate::errors::Error;
    use std::{fs::File, io::BufReader};

    let file = File::open(filepath)?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader).map_err(Error::from)
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use super::*;
    use crate::engine::{OrderSide, PricePoint};
    use crate::errors::Error;

    #[test]
    fn reads_a_json_tape() {
        let path = std::env::temp_dir().join(format!("tradeloop-tape-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"[{"id": 2, "price": 101.5, "volume": 0.5, "time": 1515151516000, "side": "sell"},
                {"id": 1, "price": 100.0, "volume": 1.0, "time": 1515151515000, "side": "buy"}]"#,
        )
        .unwrap();

        let tape = read_tape(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(tape.len(), 2);
        assert_eq!(tape[0].id(), 2);
        assert_eq!(tape[0].side(), OrderSide::Sell);
        assert_eq!(tape[1].price(), 100.0);
        assert_eq!(tape[1].time().timestamp(), 1515151515);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let result = read_tape("/nonexistent/tape.json");
        assert!(matches!(result, Err(Error::IoError(_))));
    }
}
