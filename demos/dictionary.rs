//! Drives `Scripting.Dictionary` through late-bound calls.
//!
//! Run with `RUST_LOG=trace cargo run --example dictionary` on Windows.

#[cfg(windows)]
fn main() -> anyhow::Result<()> {
    use anyhow::Context;
    use dispatch_args::{DispatchArgs, DispatchObject, HasDispatch, Invocation, Variant};

    env_logger::init();

    let dictionary = DispatchObject::from_prog_id("Scripting.Dictionary")
        .context("Scripting.Dictionary is not registered")?;

    let mut args = DispatchArgs::new();
    for (key, value) in [("answer", Variant::I4(42)), ("greeting", Variant::from("hello"))] {
        args.add(Variant::from(key))?;
        args.add(value)?;
        dictionary.call("Add", &mut args)?;
        args.clear();
    }

    let count = dictionary.invoke(dictionary.get_dispid("Count")?, Invocation::PropertyGet, &mut args)?;
    log::info!("dictionary holds {:?} entries", count);

    args.add(Variant::from("greeting"))?;
    let item = dictionary.get_dispid("Item")?;
    let greeting = dictionary.invoke(item, Invocation::PropertyGet, &mut args)?;
    println!("greeting = {}", greeting.as_str().unwrap_or_default());

    args.clear();
    args.add(Variant::from("answer"))?;
    let exists = dictionary.call("Exists", &mut args)?;
    println!("answer exists = {}", exists.as_bool().unwrap_or_default());

    Ok(())
}

#[cfg(not(windows))]
fn main() {
    env_logger::init();
    log::error!("this demo needs Windows automation objects");
}
