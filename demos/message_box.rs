//! Message box payload.
//!
//! Bootstraps `LoadLibraryA`/`GetProcAddress`, loads `User32.dll`, shows a message box and then
//! launches the calculator. Every string is built on the stack with `local_cstr!`.
//!
//! Built with `--no-default-features --features payload` for an `x86_64`/`i686-pc-windows-gnu`
//! target this is a `no_std` image whose `.text` starts with the `entry!` trampoline; with the
//! default features it runs as an ordinary Windows program on either toolchain.

#![cfg_attr(all(windows, not(feature = "std")), no_std, no_main)]
#![cfg_attr(not(windows), allow(dead_code))]

use core::ffi::c_void;

use relocatable::context::{Foundation, ModuleHandle, ResolutionTable};
use relocatable::{local_cstr, ResolveResult};

type MessageBoxAFn =
    unsafe extern "system" fn(h_wnd: *mut c_void, lp_text: *const u8, lp_caption: *const u8, u_type: u32) -> i32;
type WinExecFn = unsafe extern "system" fn(lp_cmd_line: *const u8, u_cmd_show: u32) -> u32;

const MB_OK: u32 = 0x0000_0000;
const SW_SHOW: u32 = 5;

#[allow(dead_code)]
struct FunctionTable {
    user32: ModuleHandle,
    kernel32: ModuleHandle,
    message_box_a: MessageBoxAFn,
    win_exec: WinExecFn,
}

impl ResolutionTable for FunctionTable {
    unsafe fn resolve(foundation: &Foundation) -> ResolveResult<Self> {
        let user32 = foundation.load_module(&local_cstr!("User32.dll"))?;
        let kernel32 = foundation.load_module(&local_cstr!("Kernel32.dll"))?;

        Ok(Self {
            user32,
            kernel32,
            message_box_a: foundation.symbol(user32, &local_cstr!("MessageBoxA"))?,
            win_exec: foundation.symbol(kernel32, &local_cstr!("WinExec"))?,
        })
    }
}

#[cfg(windows)]
extern "C" fn payload_main() {
    use relocatable::Relocatable;

    let Ok(context) = (unsafe { Relocatable::<FunctionTable>::current() }) else {
        return;
    };

    let title = local_cstr!("Test Title");
    let body = local_cstr!("Test Body");
    unsafe { (context.table.message_box_a)(core::ptr::null_mut(), body.as_ptr(), title.as_ptr(), MB_OK) };

    launch_calculator(&context.table);
}

fn launch_calculator(table: &FunctionTable) {
    let command = local_cstr!("calc.exe");
    unsafe { (table.win_exec)(command.as_ptr(), SW_SHOW) };
}

#[cfg(all(windows, target_env = "gnu"))]
relocatable::entry!(payload_main);

#[cfg(all(windows, not(feature = "std")))]
#[allow(non_snake_case)]
#[no_mangle]
pub extern "C" fn mainCRTStartup() -> u32 {
    payload_main();
    0
}

#[cfg(all(windows, not(feature = "std")))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}

#[cfg(all(windows, feature = "std"))]
fn main() {
    payload_main();
}

#[cfg(not(windows))]
fn main() {
    eprintln!("the message_box payload only runs on Windows");
}
