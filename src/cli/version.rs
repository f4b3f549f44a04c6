/// Display version information
pub fn execute() {
    println!("credstore {}", env!("CARGO_PKG_VERSION"));
    println!("Operator CLI for persisted signal-protocol auth state");
}
