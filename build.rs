use std::env;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let target = env::var("TARGET").unwrap_or_default();
    if target.starts_with("thumb") {
        // Only the real embedded target needs the M-profile cfg and the
        // EXC_RETURN constant baked in; host builds (tests, the `sim`
        // backend) skip this entirely.
        build_util::expose_m_profile();

        let out = &PathBuf::from(env::var_os("OUT_DIR").unwrap());
        let mut const_file = File::create(out.join("consts.rs")).unwrap();

        // EXC_RETURN value that returns to thread mode, using the process
        // stack, with no floating-point state on the stack (this kernel
        // never saves FPU context; see Non-goals).
        writeln!(const_file, "pub const EXC_RETURN_CONST: u32 = 0xFFFF_FFFD;")
            .unwrap();
    }
    Ok(())
}
