//! Demo plug-in speaking the procdb wire protocol on stdio
//!
//! Point `PROCDB_PLUGIN_PATH` at the directory holding this binary and the
//! server will discover it.

use async_trait::async_trait;
use procdb_core::{ArgType, Color, ParamSpec, ProcDef, ProcError, ProcedureKind, Value};
use procdb_wire::{FnProc, PluginLink, PluginMain, PluginProc};

fn plugin_def(name: &str, blurb: &str) -> ProcDef {
    ProcDef::new(name, ProcedureKind::Plugin)
        .blurb(blurb)
        .attribution("procdb", "procdb authors", "2026")
        .menu_path("<Image>/Filters/Demo")
}

fn invert(args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
    let color = args.first()
        .and_then(|v| v.as_color())
        .ok_or_else(|| ProcError::execution("expected a color"))?;
    Ok(vec![Value::Color(Color::rgba(1.0 - color.r, 1.0 - color.g, 1.0 - color.b, color.a))])
}

/// Creates an image through the host and names its first layer
struct MakeImage;

#[async_trait]
impl PluginProc for MakeImage {
    async fn run(&self, link: &mut PluginLink, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        let size = args.first().and_then(|v| v.as_int()).unwrap_or(256);
        let image = link.call("image-new", vec![Value::Int32(size), Value::Int32(size)])
            .await?
            .into_values()?;
        let image = image.into_iter().next()
            .ok_or_else(|| ProcError::execution("image-new returned nothing"))?;
        link.call("layer-new", vec![
            image.clone(),
            Value::Int32(size),
            Value::Int32(size),
            "Background".into(),
            Value::Float(100.0),
        ]).await?.into_values()?;
        Ok(vec![image])
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let main = PluginMain::new()
        .procedure(
            plugin_def("plug-in-echo", "Return the argument unchanged")
                .param(ParamSpec::string("text", "Any text"))
                .ret(ParamSpec::string("text", "The same text")),
            FnProc::new(|args| Ok(args)),
        )
        .procedure(
            plugin_def("plug-in-invert-color", "Invert a color")
                .param(ParamSpec::new("color", ArgType::Color, "Color to invert"))
                .ret(ParamSpec::new("inverted", ArgType::Color, "The inverted color")),
            FnProc::new(invert),
        )
        .procedure(
            plugin_def("plug-in-make-image", "Create a square image with a background layer")
                .param(ParamSpec::int32("size", "Width and height").int_range(1, 4096))
                .ret(ParamSpec::new("image", ArgType::Image, "The new image")),
            MakeImage,
        );

    if let Err(e) = main.serve_stdio().await {
        eprintln!("procdb-demo-plugin: {}", e);
        std::process::exit(1);
    }
}
