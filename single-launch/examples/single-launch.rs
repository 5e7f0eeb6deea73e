use single_launch::*;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let app_name = std::env::args().nth(1).unwrap_or_else(|| "Demo app 1".to_string());
    let store = FileStore::new(std::env::temp_dir().join("single_launch.lock"));
    let mut app = SingleLaunchArbiter::new(app_name.as_str(), store);

    if app.is_active()? {
        println!("✗ {} is already active, exiting", app_name);
        return Ok(());
    }

    app.will_present()?;
    println!("✓ {} is the active application", app_name);
    println!("  Launch it again to see the duplicate suppressed,");
    println!("  or launch with another name to hand off. Press Ctrl+C to exit.\n");

    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_ = interrupted.clone();
    ctrlc::set_handler(move || interrupted_.store(true, Ordering::SeqCst))?;

    loop {
        std::thread::sleep(Duration::from_millis(250));
        if interrupted.load(Ordering::SeqCst) {
            println!("\nInterrupted, closing");
            break;
        }
        if app.should_close()? {
            println!("⚡ Another application took over, closing");
            break;
        }
        app.keep_alive()?;
    }

    app.will_close()?;
    Ok(())
}
