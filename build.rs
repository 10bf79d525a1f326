use std::{env, io::Result, path::Path};

fn main() -> Result<()> {
    // src/vector_tile.rs is committed; regenerate from the proto only when it is missing
    if Path::new("src/vector_tile.rs").exists() {
        return Ok(());
    }

    let prev_out_dir = env::var("OUT_DIR");
    unsafe {
        env::set_var("OUT_DIR", "src/");
    }
    prost_build::compile_protos(&["src/vector_tile.proto"], &["src"])?;
    if let Ok(prev) = prev_out_dir {
        unsafe {
            env::set_var("OUT_DIR", prev);
        }
    }
    Ok(())
}
