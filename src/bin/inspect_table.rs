// src/bin/inspect_table.rs
use arrow::util::display::{ArrayFormatter, FormatOptions};
use nilcore::store::{ParquetStore, TableStore};
use std::{env, process::exit};

const PREVIEW_ROWS: usize = 10;

fn main() {
    // Expect a store directory, optionally followed by a table name.
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: {} <STORE_DIR> [TABLE]", args[0]);
        exit(1);
    }
    if let Err(e) = inspect(&args[1], args.get(2).map(String::as_str)) {
        eprintln!("Error: {:#}", e);
        exit(1);
    }
}

/// Without a table name list the store; otherwise print schema + head.
fn inspect(store_dir: &str, table: Option<&str>) -> anyhow::Result<()> {
    let store = ParquetStore::new(store_dir)?;
    let Some(table) = table else {
        for name in store.list_tables()? {
            println!("{}", name);
        }
        return Ok(());
    };

    let Some(batch) = store.read_table(table)? else {
        anyhow::bail!("table `{}` not found in {}", table, store_dir);
    };

    println!("=== Table: {} ===", table);
    println!("Rows:    {}", batch.num_rows());
    println!("Columns: {}", batch.num_columns());
    println!();

    println!("=== Schema ===");
    for field in batch.schema_ref().fields() {
        println!(
            "- {:<45} | {:<30} | nullable: {}",
            field.name(),
            format!("{:?}", field.data_type()),
            field.is_nullable()
        );
    }
    println!();

    println!("=== First {} rows ===", PREVIEW_ROWS.min(batch.num_rows()));
    let options = FormatOptions::default().with_null("null");
    let formatters = batch
        .columns()
        .iter()
        .map(|c| ArrayFormatter::try_new(c.as_ref(), &options))
        .collect::<Result<Vec<_>, _>>()?;
    let names: Vec<&str> = batch.schema_ref().fields().iter().map(|f| f.name().as_str()).collect();
    println!("{}", names.join(" | "));
    for row in 0..PREVIEW_ROWS.min(batch.num_rows()) {
        let cells: Vec<String> = formatters.iter().map(|f| f.value(row).to_string()).collect();
        println!("{}", cells.join(" | "));
    }
    Ok(())
}
