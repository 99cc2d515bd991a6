//! Images, layers and channels

use super::prelude::*;
use procdb_core::ObjectResolver;

const MAX_SIZE: i32 = 524_288;

pub struct ImageNew;
pub struct ImageDelete;
pub struct ImageList;
pub struct LayerNew;
pub struct ChannelNew;
pub struct ChannelGetColor;
pub struct ChannelSetColor;
pub struct ChannelGetOpacity;
pub struct ChannelSetOpacity;
pub struct ItemDelete;
pub struct ItemIsValid;

fn size(name: &str, description: &str) -> ParamSpec {
    ParamSpec::int32(name, description).int_range(1, MAX_SIZE)
}

fn opacity(description: &str) -> ParamSpec {
    ParamSpec::float("opacity", description).float_range(0.0, 100.0)
}

fn image_param(description: &str) -> ParamSpec {
    ParamSpec::new("image", ArgType::Image, description)
}

fn channel_param(description: &str) -> ParamSpec {
    ParamSpec::new("channel", ArgType::Channel, description)
}

#[async_trait]
impl Invoker for ImageNew {
    fn def(&self) -> ProcDef {
        def("image-new", "Creates a new image with the specified width and height")
            .param(size("width", "The width of the image"))
            .param(size("height", "The height of the image"))
            .ret(image_param("The newly created image"))
    }

    async fn invoke(&self, call: &CallContext, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        let width = int_arg(&args, 0)?;
        let height = int_arg(&args, 1)?;
        let image = call.objects().create_image(width, height);
        tracing::debug!(image, width, height, "image created");
        Ok(vec![Value::image(image)])
    }
}

#[async_trait]
impl Invoker for ImageDelete {
    fn def(&self) -> ProcDef {
        def("image-delete", "Delete the specified image and everything it owns")
            .param(image_param("The image"))
    }

    async fn invoke(&self, call: &CallContext, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        let image = object_arg(&args, 0)?;
        if !call.objects().delete(image) {
            return Err(ProcError::execution(format!("image {} is already gone", image)));
        }
        Ok(vec![])
    }
}

#[async_trait]
impl Invoker for ImageList {
    fn def(&self) -> ProcDef {
        def("image-list", "Returns the list of images currently open")
            .ret(ParamSpec::int32("num-images", "The number of images currently open"))
            .ret(ParamSpec::new("image-ids", ArgType::Int32Array, "The list of images currently open")
                .sized_by("num-images"))
    }

    async fn invoke(&self, call: &CallContext, _args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        let ids = call.objects().image_ids();
        Ok(vec![Value::Int32(ids.len() as i32), Value::Int32Array(ids)])
    }
}

#[async_trait]
impl Invoker for LayerNew {
    fn def(&self) -> ProcDef {
        def("layer-new", "Create a new layer attached to an image")
            .param(image_param("The image to which to add the layer"))
            .param(size("width", "The layer width"))
            .param(size("height", "The layer height"))
            .param(ParamSpec::string("name", "The layer name"))
            .param(opacity("The layer opacity"))
            .ret(ParamSpec::new("layer", ArgType::Layer, "The newly created layer"))
    }

    async fn invoke(&self, call: &CallContext, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        let image = object_arg(&args, 0)?;
        let layer = call.objects()
            .create_layer(image, int_arg(&args, 1)?, int_arg(&args, 2)?, str_arg(&args, 3)?, float_arg(&args, 4)?)
            .ok_or_else(|| ProcError::execution(format!("image {} disappeared", image)))?;
        Ok(vec![Value::layer(layer)])
    }
}

#[async_trait]
impl Invoker for ChannelNew {
    fn def(&self) -> ProcDef {
        def("channel-new", "Create a new channel")
            .help("The new channel still needs to be added to the image; its color is used for compositing")
            .param(image_param("The image to which to add the channel"))
            .param(size("width", "The channel width"))
            .param(size("height", "The channel height"))
            .param(ParamSpec::string("name", "The channel name"))
            .param(opacity("The channel opacity"))
            .param(ParamSpec::new("color", ArgType::Color, "The channel compositing color"))
            .ret(channel_param("The newly created channel"))
    }

    async fn invoke(&self, call: &CallContext, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        let image = object_arg(&args, 0)?;
        let channel = call.objects()
            .create_channel(
                image,
                int_arg(&args, 1)?,
                int_arg(&args, 2)?,
                str_arg(&args, 3)?,
                float_arg(&args, 4)?,
                color_arg(&args, 5)?,
            )
            .ok_or_else(|| ProcError::execution(format!("image {} disappeared", image)))?;
        Ok(vec![Value::channel(channel)])
    }
}

#[async_trait]
impl Invoker for ChannelGetColor {
    fn def(&self) -> ProcDef {
        def("channel-get-color", "Get the compositing color of the specified channel")
            .param(channel_param("The channel"))
            .ret(ParamSpec::new("color", ArgType::Color, "The channel compositing color"))
    }

    async fn invoke(&self, call: &CallContext, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        let channel = object_arg(&args, 0)?;
        let color = call.objects().color(channel)
            .ok_or_else(|| ProcError::execution(format!("channel {} disappeared", channel)))?;
        Ok(vec![Value::Color(color)])
    }
}

#[async_trait]
impl Invoker for ChannelSetColor {
    fn def(&self) -> ProcDef {
        def("channel-set-color", "Set the compositing color of the specified channel")
            .param(channel_param("The channel"))
            .param(ParamSpec::new("color", ArgType::Color, "The new channel compositing color"))
    }

    async fn invoke(&self, call: &CallContext, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        let channel = object_arg(&args, 0)?;
        // Channel colors are stored opaque; opacity is a separate property
        let color = color_arg(&args, 1)?;
        if !call.objects().set_color(channel, Color { a: 1.0, ..color }) {
            return Err(ProcError::execution(format!("channel {} disappeared", channel)));
        }
        Ok(vec![])
    }
}

#[async_trait]
impl Invoker for ChannelGetOpacity {
    fn def(&self) -> ProcDef {
        def("channel-get-opacity", "Get the opacity of the specified channel")
            .param(channel_param("The channel"))
            .ret(opacity("The channel opacity"))
    }

    async fn invoke(&self, call: &CallContext, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        let channel = object_arg(&args, 0)?;
        let opacity = call.objects().opacity(channel)
            .ok_or_else(|| ProcError::execution(format!("channel {} disappeared", channel)))?;
        Ok(vec![Value::Float(opacity)])
    }
}

#[async_trait]
impl Invoker for ChannelSetOpacity {
    fn def(&self) -> ProcDef {
        def("channel-set-opacity", "Set the opacity of the specified channel")
            .param(channel_param("The channel"))
            .param(opacity("The new channel opacity"))
    }

    async fn invoke(&self, call: &CallContext, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        let channel = object_arg(&args, 0)?;
        if !call.objects().set_opacity(channel, float_arg(&args, 1)?) {
            return Err(ProcError::execution(format!("channel {} disappeared", channel)));
        }
        Ok(vec![])
    }
}

#[async_trait]
impl Invoker for ItemDelete {
    fn def(&self) -> ProcDef {
        def("item-delete", "Delete a layer or channel")
            .param(ParamSpec::new("item", ArgType::Drawable, "The item to delete"))
    }

    async fn invoke(&self, call: &CallContext, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        let item = object_arg(&args, 0)?;
        if !call.objects().delete(item) {
            return Err(ProcError::execution(format!("item {} is already gone", item)));
        }
        Ok(vec![])
    }
}

#[async_trait]
impl Invoker for ItemIsValid {
    fn def(&self) -> ProcDef {
        def("item-is-valid", "Returns TRUE if the item ID refers to a live object")
            .help("Takes a plain INT32 so that stale ids can be tested without a calling error")
            .param(ParamSpec::int32("item-id", "The item id to check"))
            .ret(ParamSpec::int32("valid", "Whether the id is valid").int_range(0, 1))
    }

    async fn invoke(&self, call: &CallContext, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        let id = int_arg(&args, 0)?;
        let kinds = [ObjectKind::Image, ObjectKind::Layer, ObjectKind::Channel, ObjectKind::Vectors];
        let valid = kinds.iter().any(|kind| call.objects().is_live(*kind, id));
        Ok(vec![Value::from(valid)])
    }
}
