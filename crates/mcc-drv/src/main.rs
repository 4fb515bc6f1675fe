use std::process::exit;

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = match mcc_drv::parse_args(&args) {
        Ok(config) => config,
        Err(msg) => {
            eprintln!("{}", msg);
            exit(1);
        }
    };
    match mcc_drv::run(&config) {
        Ok(code) => exit(code),
        Err(err) => {
            eprintln!("mcc: {:#}", err);
            exit(1);
        }
    }
}
