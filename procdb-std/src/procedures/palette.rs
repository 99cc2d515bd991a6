use super::prelude::*;

pub struct PaletteNew;
pub struct PaletteGetColumns;
pub struct PaletteSetColumns;

#[async_trait]
impl Invoker for PaletteNew {
    fn def(&self) -> ProcDef {
        def("palette-new", "Creates a new palette")
            .param(ParamSpec::string("name", "The requested name of the new palette"))
            .ret(ParamSpec::string("actual-name", "The actual new palette name"))
    }

    async fn invoke(&self, call: &CallContext, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        let requested = str_arg(&args, 0)?;
        if requested.is_empty() {
            return Err(ProcError::execution("palette names cannot be empty"));
        }
        let mut name = requested.to_string();
        let mut n = 1;
        while !call.objects().add_palette(&name) {
            n += 1;
            name = format!("{} #{}", requested, n);
        }
        Ok(vec![Value::String(name)])
    }
}

#[async_trait]
impl Invoker for PaletteGetColumns {
    fn def(&self) -> ProcDef {
        def("palette-get-columns", "Retrieves the number of columns to use to display this palette")
            .param(ParamSpec::string("name", "The palette name"))
            .ret(ParamSpec::int32("num-columns", "The number of columns used to display this palette"))
    }

    async fn invoke(&self, call: &CallContext, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        let name = str_arg(&args, 0)?;
        let palette = call.objects().palette(name)
            .ok_or_else(|| ProcError::execution(format!("no palette named '{}'", name)))?;
        Ok(vec![Value::Int32(palette.columns)])
    }
}

#[async_trait]
impl Invoker for PaletteSetColumns {
    fn def(&self) -> ProcDef {
        def("palette-set-columns", "Sets the number of columns to use when displaying the palette")
            .param(ParamSpec::string("name", "The palette name"))
            .param(ParamSpec::int32("columns", "The new number of columns").int_range(0, 256))
    }

    async fn invoke(&self, call: &CallContext, args: Vec<Value>) -> Result<Vec<Value>, ProcError> {
        let name = str_arg(&args, 0)?;
        if call.objects().set_palette_columns(name, int_arg(&args, 1)?) {
            Ok(vec![])
        } else {
            Err(ProcError::execution(format!("no palette named '{}'", name)))
        }
    }
}
