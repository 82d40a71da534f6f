extern crate cbindgen;

use cbindgen::{Config, Language};
use std::env;
use std::path::PathBuf;

fn main() {
    let crate_dir = env::var("CARGO_MANIFEST_DIR").unwrap();

    let package_name = env::var("CARGO_PKG_NAME").unwrap();
    let output_file = PathBuf::from("")
        .join(format!("{}.hpp", package_name))
        .display()
        .to_string();

    let mut config = Config {
        include_guard: Some(String::from("UDS_DIAG_CORE_H_")),
        namespace: Some(String::from("uds_diag_core")),
        language: Language::Cxx,
        ..Default::default()
    };
    config.parse.parse_deps = true;
    config.parse.include = Some(vec!["uds_diag_core".into()]);

    cbindgen::generate_with_config(&crate_dir, config)
        .unwrap()
        .write_to_file(&output_file);
}
