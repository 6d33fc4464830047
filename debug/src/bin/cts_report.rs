//! `cts_report <input_log_or_xml> <output_html>`

use std::path::Path;

fn main() {
    debug::init_logging();
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 {
        eprintln!("Usage: cts_report <input_log_or_xml> <output_html>");
        std::process::exit(1);
    }
    match icdprobe_report::generate_report(Path::new(&args[1]), Path::new(&args[2])) {
        Ok(summary) => {
            println!("HTML report saved to: {}", summary.output.display());
            println!("{} page(s) written", summary.pages.len());
            println!();
            println!("{}", summary.statistics);
        }
        Err(err) => {
            eprintln!("Error: {}", err);
            std::process::exit(1);
        }
    }
}
