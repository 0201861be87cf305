use anyhow::Result;

use crate::cli::IndexArgs;
use crate::system::build_index;

use super::write_json;

pub fn run(args: IndexArgs) -> Result<()> {
    let stats = build_index(&args.db, &args.input, args.embedding_dim)?;
    write_json(&stats, "index stats")
}
