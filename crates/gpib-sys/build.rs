//! Generates the linux-gpib bindings.
//!
//! With the `gpib-sdk` feature, bindgen reads `<gpib/ib.h>` and the crate
//! links against `libgpib` (found via pkg-config, or `GPIB_INCLUDE_DIR` and
//! the default search path). Without it, placeholder bindings are written
//! so that dependents build on machines without linux-gpib.

use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=wrapper.h");
    println!("cargo:rerun-if-env-changed=GPIB_INCLUDE_DIR");

    #[cfg(feature = "gpib-sdk")]
    generate_bindings(&locate_libgpib());

    #[cfg(not(feature = "gpib-sdk"))]
    generate_dummy_bindings();
}

/// Emit link directives and return the include directories for bindgen.
#[cfg(feature = "gpib-sdk")]
fn locate_libgpib() -> Vec<PathBuf> {
    if let Ok(dir) = env::var("GPIB_INCLUDE_DIR") {
        println!("cargo:rustc-link-lib=gpib");
        return vec![PathBuf::from(dir)];
    }
    match pkg_config::probe_library("libgpib") {
        Ok(lib) => lib.include_paths,
        Err(e) => {
            println!("cargo:warning=pkg-config could not find libgpib ({e}), using defaults");
            println!("cargo:rustc-link-lib=gpib");
            Vec::new()
        }
    }
}

#[cfg(feature = "gpib-sdk")]
fn generate_bindings(include_dirs: &[PathBuf]) {
    let bindings = bindgen::Builder::default()
        .header("wrapper.h")
        .clang_args(include_dirs.iter().map(|d| format!("-I{}", d.display())))
        // Traditional NI-488 entry points
        .allowlist_function("ib.*")
        // Status registers
        .allowlist_var("ibsta|iberr|ibcnt|ibcntl")
        // Enumerations from gpib_user.h
        .allowlist_type("ibsta_bits|iberr_code|gpib_timeout|eos_flags|bus_control_line")
        .allowlist_type("Addr4882_t")
        // Flat constant names, matching the dummy bindings
        .default_enum_style(bindgen::EnumVariation::Consts)
        .prepend_enum_name(false)
        .derive_default(true)
        .parse_callbacks(Box::new(bindgen::CargoCallbacks::new()))
        .generate()
        .expect("Unable to generate linux-gpib bindings");

    let out_path = PathBuf::from(env::var("OUT_DIR").unwrap());
    bindings
        .write_to_file(out_path.join("bindings.rs"))
        .expect("Couldn't write bindings!");
}

/// Constants match `gpib_user.h`; every function panics.
#[cfg(not(feature = "gpib-sdk"))]
fn generate_dummy_bindings() {
    let out_path = PathBuf::from(env::var("OUT_DIR").unwrap());
    let dummy = r#"
// Placeholder bindings: built without the `gpib-sdk` feature.

use std::os::raw::{c_char, c_int, c_long, c_short, c_uint, c_void};

/// Packed primary/secondary address (MakeAddr)
pub type Addr4882_t = u16;

// ibsta status bits
pub const DCAS: c_uint = 0x1;
pub const DTAS: c_uint = 0x2;
pub const LACS: c_uint = 0x4;
pub const TACS: c_uint = 0x8;
pub const ATN: c_uint = 0x10;
pub const CIC: c_uint = 0x20;
pub const REM: c_uint = 0x40;
pub const LOK: c_uint = 0x80;
pub const CMPL: c_uint = 0x100;
pub const EVENT: c_uint = 0x200;
pub const SPOLL: c_uint = 0x400;
pub const RQS: c_uint = 0x800;
pub const SRQI: c_uint = 0x1000;
pub const END: c_uint = 0x2000;
pub const TIMO: c_uint = 0x4000;
pub const ERR: c_uint = 0x8000;

// iberr error codes
pub const EDVR: c_uint = 0;
pub const ECIC: c_uint = 1;
pub const ENOL: c_uint = 2;
pub const EADR: c_uint = 3;
pub const EARG: c_uint = 4;
pub const ESAC: c_uint = 5;
pub const EABO: c_uint = 6;
pub const ENEB: c_uint = 7;
pub const EDMA: c_uint = 8;
pub const EOIP: c_uint = 10;
pub const ECAP: c_uint = 11;
pub const EFSO: c_uint = 12;
pub const EBUS: c_uint = 14;
pub const ESTB: c_uint = 15;
pub const ESRQ: c_uint = 16;
pub const ETAB: c_uint = 20;

// Timeout codes for ibdev/ibtmo
pub const TNONE: c_uint = 0;
pub const T10us: c_uint = 1;
pub const T30us: c_uint = 2;
pub const T100us: c_uint = 3;
pub const T300us: c_uint = 4;
pub const T1ms: c_uint = 5;
pub const T3ms: c_uint = 6;
pub const T10ms: c_uint = 7;
pub const T30ms: c_uint = 8;
pub const T100ms: c_uint = 9;
pub const T300ms: c_uint = 10;
pub const T1s: c_uint = 11;
pub const T3s: c_uint = 12;
pub const T10s: c_uint = 13;
pub const T30s: c_uint = 14;
pub const T100s: c_uint = 15;
pub const T300s: c_uint = 16;
pub const T1000s: c_uint = 17;

// End-of-string modes
pub const EOS_MASK: c_uint = 0x1c00;
pub const REOS: c_uint = 0x400;
pub const XEOS: c_uint = 0x800;
pub const BIN: c_uint = 0x1000;

// Bus control line bits returned by iblines
pub const ValidDAV: c_uint = 0x01;
pub const ValidNDAC: c_uint = 0x02;
pub const ValidNRFD: c_uint = 0x04;
pub const ValidIFC: c_uint = 0x08;
pub const ValidREN: c_uint = 0x10;
pub const ValidSRQ: c_uint = 0x20;
pub const ValidATN: c_uint = 0x40;
pub const ValidEOI: c_uint = 0x80;
pub const ValidALL: c_uint = 0xff;
pub const BusDAV: c_uint = 0x0100;
pub const BusNDAC: c_uint = 0x0200;
pub const BusNRFD: c_uint = 0x0400;
pub const BusIFC: c_uint = 0x0800;
pub const BusREN: c_uint = 0x1000;
pub const BusSRQ: c_uint = 0x2000;
pub const BusATN: c_uint = 0x4000;
pub const BusEOI: c_uint = 0x8000;

// Process-global status registers. The real library updates these after
// every call; the placeholders stay zero.
#[no_mangle]
pub static mut ibsta: c_int = 0;
#[no_mangle]
pub static mut iberr: c_int = 0;
#[no_mangle]
pub static mut ibcnt: c_int = 0;
#[no_mangle]
pub static mut ibcntl: c_long = 0;

// Stubs so dependents link; none of them may be called.

const GPIB_SDK_PANIC_MSG: &str = "linux-gpib function called but gpib-sdk feature is not enabled. \
    Enable the gpib-sdk feature (or `hardware` in daq-driver-gpib) to use the real library.";

#[no_mangle]
pub unsafe extern "C" fn ibdev(
    _board_index: c_int,
    _pad: c_int,
    _sad: c_int,
    _timo: c_int,
    _send_eoi: c_int,
    _eosmode: c_int,
) -> c_int {
    panic!("{}", GPIB_SDK_PANIC_MSG);
}

#[no_mangle]
pub unsafe extern "C" fn ibonl(_ud: c_int, _onl: c_int) -> c_int {
    panic!("{}", GPIB_SDK_PANIC_MSG);
}

#[no_mangle]
pub unsafe extern "C" fn ibrd(_ud: c_int, _buf: *mut c_void, _count: c_long) -> c_int {
    panic!("{}", GPIB_SDK_PANIC_MSG);
}

#[no_mangle]
pub unsafe extern "C" fn ibwrt(_ud: c_int, _buf: *const c_void, _count: c_long) -> c_int {
    panic!("{}", GPIB_SDK_PANIC_MSG);
}

#[no_mangle]
pub unsafe extern "C" fn ibclr(_ud: c_int) -> c_int {
    panic!("{}", GPIB_SDK_PANIC_MSG);
}

#[no_mangle]
pub unsafe extern "C" fn ibtrg(_ud: c_int) -> c_int {
    panic!("{}", GPIB_SDK_PANIC_MSG);
}

#[no_mangle]
pub unsafe extern "C" fn ibrsp(_ud: c_int, _spr: *mut c_char) -> c_int {
    panic!("{}", GPIB_SDK_PANIC_MSG);
}

#[no_mangle]
pub unsafe extern "C" fn iblines(_ud: c_int, _line_status: *mut c_short) -> c_int {
    panic!("{}", GPIB_SDK_PANIC_MSG);
}

#[no_mangle]
pub unsafe extern "C" fn ibsic(_ud: c_int) -> c_int {
    panic!("{}", GPIB_SDK_PANIC_MSG);
}

#[no_mangle]
pub unsafe extern "C" fn ibsre(_ud: c_int, _v: c_int) -> c_int {
    panic!("{}", GPIB_SDK_PANIC_MSG);
}

#[no_mangle]
pub unsafe extern "C" fn ibtmo(_ud: c_int, _v: c_int) -> c_int {
    panic!("{}", GPIB_SDK_PANIC_MSG);
}

#[no_mangle]
pub unsafe extern "C" fn ibln(
    _ud: c_int,
    _pad: c_int,
    _sad: c_int,
    _found_listener: *mut c_short,
) -> c_int {
    panic!("{}", GPIB_SDK_PANIC_MSG);
}

#[no_mangle]
pub unsafe extern "C" fn ibvers(_version: *mut *mut c_char) {
    panic!("{}", GPIB_SDK_PANIC_MSG);
}
"#;

    std::fs::write(out_path.join("bindings.rs"), dummy).expect("Couldn't write dummy bindings!");
}
