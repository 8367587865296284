use which::which;

/// Rebuild when bpf-linker changes, since cargo cannot see it otherwise.
fn main() {
    match which("bpf-linker") {
        Ok(bpf_linker) => println!("cargo:rerun-if-changed={}", bpf_linker.display()),
        Err(e) => println!("cargo:warning=bpf-linker not found: {e}"),
    }
}
