use polars::prelude::*;
use redline_core::classify::FileFormat;
use redline_core::normalize::{standardize_stooq, NormalizeOptions, NullPolicy};

fn main() {
    let df = df!(
        "<TICKER>" => &["AAPL"],
        "<DATE>" => &[20240102i64],
        "<TIME>" => &[93000i64],
        "<OPEN>" => &[184.2],
        "<HIGH>" => &[185.9],
        "<LOW>" => &[183.4],
        "<CLOSE>" => &[185.1],
        "<VOL>" => &[1.0],
    ).unwrap();

    // replicate the rename loop manually to observe
    let mut d2 = df.clone();
    println!("before: {:?}", d2.get_column_names());
    d2.rename("<DATE>", "date".into()).unwrap();
    println!("after rename <DATE>: {:?}", d2.get_column_names());

    let opts = NormalizeOptions { policy: NullPolicy::AllPrices, year_range: Some((1900,2100)) };
    match standardize_stooq(df, FileFormat::Txt, &opts) {
        Ok(out) => println!("OK height={} schema={:?}", out.height(), out.schema()),
        Err(e) => println!("ERR: {e}"),
    }
}
