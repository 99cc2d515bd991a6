//! procdb Standard Procedures

pub mod procedures;

use procdb::Session;
use procdb_core::PdbError;

/// Register the standard internal procedures with a session
pub fn load_standard_procedures(session: &Session) -> Result<(), PdbError> {
    use procedures::*;

    // Images and items
    session.register(ImageNew)?;
    session.register(ImageDelete)?;
    session.register(ImageList)?;
    session.register(LayerNew)?;
    session.register(ChannelNew)?;
    session.register(ChannelGetColor)?;
    session.register(ChannelSetColor)?;
    session.register(ChannelGetOpacity)?;
    session.register(ChannelSetOpacity)?;
    session.register(ItemDelete)?;
    session.register(ItemIsValid)?;
    session.register(ImageUndoGroupStart)?;
    session.register(ImageUndoGroupEnd)?;
    // Buffers and palettes
    session.register(BuffersGetList)?;
    session.register(BufferRename)?;
    session.register(BufferDelete)?;
    session.register(BufferGetWidth)?;
    session.register(BufferGetHeight)?;
    session.register(PaletteNew)?;
    session.register(PaletteGetColumns)?;
    session.register(PaletteSetColumns)?;
    // Context
    session.register(ContextPush)?;
    session.register(ContextPop)?;
    session.register(ContextGetForeground)?;
    session.register(ContextSetForeground)?;
    // Files
    session.register(RegisterLoadHandler)?;
    session.register(RegisterSaveHandler)?;
    session.register(FileLoad)?;
    session.register(FileSave)?;
    session.register(TempName)?;
    // Introspection
    session.register(PdbProcExists)?;
    session.register(PdbQuery)?;
    session.register(PdbProcInfo)?;
    session.register(PdbProcArg)?;
    session.register(PdbProcVal)?;

    tracing::info!(procedures = session.registry().len(), "standard procedures loaded");
    Ok(())
}

/// Default session with the standard procedures
pub fn standard_session() -> Result<Session, PdbError> {
    let session = Session::default();
    load_standard_procedures(&session)?;
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use procdb::{FnInvoker, ProcResult, Status, Value};
    use procdb_core::{codes, ArgType, Color, ParamSpec, ProcDef, ProcedureKind};
    use std::sync::{Arc, Mutex};

    fn session() -> Session {
        standard_session().unwrap()
    }

    async fn ok(session: &Session, name: &str, args: Vec<Value>) -> Vec<Value> {
        let result = session.execute(name, args).await;
        assert!(result.is_success(), "{} failed: {:?}", name, result.message);
        result.returns
    }

    async fn new_image(session: &Session) -> Value {
        ok(session, "image-new", vec![Value::Int32(64), Value::Int32(48)]).await.remove(0)
    }

    #[test]
    fn test_loading_twice_fails() {
        let session = session();
        let err = load_standard_procedures(&session).unwrap_err();
        assert_eq!(err.code, codes::ALREADY_REGISTERED);
    }

    mod image_tests {
        use super::*;

        #[tokio::test]
        async fn test_image_lifecycle() {
            let session = session();
            let image = new_image(&session).await;
            let id = image.object_id().unwrap();

            let list = ok(&session, "image-list", vec![]).await;
            assert_eq!(list, vec![Value::Int32(1), Value::Int32Array(vec![id])]);

            ok(&session, "image-delete", vec![image.clone()]).await;
            let result = session.execute("image-delete", vec![image]).await;
            assert_eq!(result.status, Status::CallingError);
        }

        #[tokio::test]
        async fn test_image_size_bounds() {
            let session = session();
            let result = session.execute("image-new", vec![Value::Int32(0), Value::Int32(10)]).await;
            assert_eq!(result.status, Status::CallingError);
            let result = session.execute("image-new", vec![Value::Int32(10), Value::Int32(524_289)]).await;
            assert_eq!(result.status, Status::CallingError);
        }

        #[tokio::test]
        async fn test_channel_properties() {
            let session = session();
            let image = new_image(&session).await;
            let channel = ok(&session, "channel-new", vec![
                image, Value::Int32(64), Value::Int32(48), "mask".into(),
                Value::Float(50.0), Value::Color(Color::rgb(1.0, 0.0, 0.0)),
            ]).await.remove(0);
            assert_eq!(channel.arg_type(), ArgType::Channel);

            let opacity = ok(&session, "channel-get-opacity", vec![channel.clone()]).await;
            assert_eq!(opacity, vec![Value::Float(50.0)]);

            let result = session.execute("channel-set-opacity", vec![channel.clone(), Value::Float(100.5)]).await;
            assert_eq!(result.status, Status::CallingError);

            ok(&session, "channel-set-color", vec![channel.clone(), Value::Color(Color::rgba(0.0, 1.0, 0.0, 0.2))]).await;
            let color = ok(&session, "channel-get-color", vec![channel]).await;
            assert_eq!(color, vec![Value::Color(Color::rgb(0.0, 1.0, 0.0))]);
        }

        #[tokio::test]
        async fn test_item_is_valid_tracks_deletion() {
            let session = session();
            let image = new_image(&session).await;
            let layer = ok(&session, "layer-new", vec![
                image, Value::Int32(10), Value::Int32(10), "bg".into(), Value::Float(100.0),
            ]).await.remove(0);
            let id = Value::Int32(layer.object_id().unwrap());

            assert_eq!(ok(&session, "item-is-valid", vec![id.clone()]).await, vec![Value::Int32(1)]);
            ok(&session, "item-delete", vec![Value::drawable(layer.object_id().unwrap())]).await;
            assert_eq!(ok(&session, "item-is-valid", vec![id]).await, vec![Value::Int32(0)]);
            assert_eq!(ok(&session, "item-is-valid", vec![Value::Int32(-1)]).await, vec![Value::Int32(0)]);
        }

        #[tokio::test]
        async fn test_undo_group_end_without_start() {
            let session = session();
            let image = new_image(&session).await;
            let result = session.execute("image-undo-group-end", vec![image.clone()]).await;
            assert_eq!(result.status, Status::ExecutionError);

            ok(&session, "image-undo-group-start", vec![image.clone()]).await;
            ok(&session, "image-undo-group-end", vec![image]).await;
        }
    }

    mod buffer_tests {
        use super::*;

        fn with_buffers() -> Session {
            let session = session();
            session.objects().add_buffer("clip", 30, 20);
            session.objects().add_buffer("logo", 8, 8);
            session
        }

        #[tokio::test]
        async fn test_filter() {
            let session = with_buffers();
            let all = ok(&session, "buffers-get-list", vec!["".into()]).await;
            assert_eq!(all[0], Value::Int32(2));

            let some = ok(&session, "buffers-get-list", vec!["^lo".into()]).await;
            assert_eq!(some, vec![Value::Int32(1), Value::StringArray(vec!["logo".into()])]);

            let result = session.execute("buffers-get-list", vec!["(".into()]).await;
            assert_eq!(result.status, Status::ExecutionError);
        }

        #[tokio::test]
        async fn test_rename_uniquifies() {
            let session = with_buffers();
            let real = ok(&session, "buffer-rename", vec!["clip".into(), "logo".into()]).await;
            assert_eq!(real, vec![Value::String("logo #2".into())]);

            let width = ok(&session, "buffer-get-width", vec!["logo #2".into()]).await;
            assert_eq!(width, vec![Value::Int32(30)]);
        }

        #[tokio::test]
        async fn test_missing_buffer() {
            let session = with_buffers();
            for name in ["buffer-delete", "buffer-get-width", "buffer-get-height"] {
                let result = session.execute(name, vec!["nope".into()]).await;
                assert_eq!(result.status, Status::ExecutionError, "{}", name);
            }
        }
    }

    mod palette_tests {
        use super::*;

        #[tokio::test]
        async fn test_new_uniquifies() {
            let session = session();
            assert_eq!(ok(&session, "palette-new", vec!["Warm".into()]).await, vec![Value::String("Warm".into())]);
            assert_eq!(ok(&session, "palette-new", vec!["Warm".into()]).await, vec![Value::String("Warm #2".into())]);
        }

        #[tokio::test]
        async fn test_columns_bounds() {
            let session = session();
            ok(&session, "palette-new", vec!["Warm".into()]).await;

            let result = session.execute("palette-set-columns", vec!["Warm".into(), Value::Int32(300)]).await;
            assert_eq!(result.status, Status::CallingError);

            ok(&session, "palette-set-columns", vec!["Warm".into(), Value::Int32(256)]).await;
            assert_eq!(ok(&session, "palette-get-columns", vec!["Warm".into()]).await, vec![Value::Int32(256)]);
        }
    }

    mod context_tests {
        use super::*;

        #[tokio::test]
        async fn test_push_needs_plug_in() {
            let session = session();
            assert_eq!(session.execute("context-push", vec![]).await.status, Status::ExecutionError);
            assert_eq!(session.execute("context-pop", vec![]).await.status, Status::ExecutionError);
        }

        #[tokio::test]
        async fn test_foreground_on_root() {
            let session = session();
            let red = Value::Color(Color::rgb(1.0, 0.0, 0.0));
            ok(&session, "context-set-foreground", vec![red.clone()]).await;
            assert_eq!(ok(&session, "context-get-foreground", vec![]).await, vec![red]);
        }
    }

    mod file_tests {
        use super::*;

        fn with_handlers(saved: Arc<Mutex<Vec<Value>>>) -> Session {
            let session = session();
            session.register(FnInvoker::new(
                ProcDef::new("file-fake-load", ProcedureKind::Internal)
                    .param(ParamSpec::int32("run-mode", ""))
                    .param(ParamSpec::string("filename", ""))
                    .param(ParamSpec::string("raw-filename", ""))
                    .ret(ParamSpec::new("image", ArgType::Image, "")),
                |call, _| Ok(vec![Value::image(call.objects().create_image(4, 4))]),
            )).unwrap();
            session.register(FnInvoker::new(
                ProcDef::new("file-fake-save", ProcedureKind::Internal)
                    .param(ParamSpec::int32("run-mode", ""))
                    .param(ParamSpec::new("image", ArgType::Image, ""))
                    .param(ParamSpec::new("drawable", ArgType::Drawable, ""))
                    .param(ParamSpec::string("filename", ""))
                    .param(ParamSpec::string("raw-filename", ""))
                    .param(ParamSpec::int32("compression", "").int_range(0, 9).with_default(6)),
                move |_, args| {
                    *saved.lock().unwrap() = args;
                    Ok(vec![])
                },
            )).unwrap();
            session
        }

        async fn register(session: &Session) {
            ok(session, "register-load-handler", vec!["file-fake-load".into(), "fake, FK".into(), "".into()]).await;
            ok(session, "register-save-handler", vec!["file-fake-save".into(), ".fake".into(), "".into()]).await;
        }

        #[tokio::test]
        async fn test_load_forwards_by_extension() {
            let session = with_handlers(Arc::default());
            register(&session).await;

            let image = ok(&session, "file-load", vec![Value::Int32(1), "/tmp/a.FK".into(), "a.FK".into()]).await;
            assert_eq!(image[0].arg_type(), ArgType::Image);

            let result = session.execute("file-load", vec![Value::Int32(1), "/tmp/a.png".into(), "a.png".into()]).await;
            assert_eq!(result.status, Status::ExecutionError);
        }

        #[tokio::test]
        async fn test_save_fills_handler_defaults() {
            let saved = Arc::new(Mutex::new(Vec::new()));
            let session = with_handlers(saved.clone());
            register(&session).await;

            let image = new_image(&session).await;
            let layer = ok(&session, "layer-new", vec![
                image.clone(), Value::Int32(10), Value::Int32(10), "bg".into(), Value::Float(100.0),
            ]).await.remove(0);
            let drawable = Value::drawable(layer.object_id().unwrap());
            ok(&session, "file-save", vec![
                Value::Int32(1), image, drawable, "/tmp/out.fake".into(), "out.fake".into(),
            ]).await;

            let args = saved.lock().unwrap().clone();
            assert_eq!(args.len(), 6);
            assert_eq!(args[5], Value::Int32(6));
        }

        #[tokio::test]
        async fn test_handler_must_exist() {
            let session = session();
            let result = session.execute("register-load-handler", vec!["nope".into(), "x".into(), "".into()]).await;
            assert_eq!(result.status, Status::ExecutionError);
        }

        #[tokio::test]
        async fn test_temp_names_differ() {
            let session = session();
            let a = ok(&session, "temp-name", vec!["png".into()]).await;
            let b = ok(&session, "temp-name", vec!["png".into()]).await;
            assert_ne!(a, b);
            assert!(a[0].as_str().unwrap().ends_with(".png"));
        }
    }

    mod pdb_tests {
        use super::*;

        #[tokio::test]
        async fn test_exists_and_query() {
            let session = session();
            assert_eq!(ok(&session, "pdb-proc-exists", vec!["image-new".into()]).await, vec![Value::Int32(1)]);
            assert_eq!(ok(&session, "pdb-proc-exists", vec!["image-old".into()]).await, vec![Value::Int32(0)]);

            let found = ok(&session, "pdb-query", vec!["^buffer-get".into()]).await;
            assert_eq!(found[1], Value::StringArray(vec!["buffer-get-height".into(), "buffer-get-width".into()]));
        }

        #[tokio::test]
        async fn test_proc_info() {
            let session = session();
            let info = ok(&session, "pdb-proc-info", vec!["layer-new".into()]).await;
            assert_eq!(info[5], Value::Int32(ProcedureKind::Internal.code() as i32));
            assert_eq!(info[6], Value::Int32(5));
            assert_eq!(info[7], Value::Int32(1));

            let result: ProcResult = session.execute("pdb-proc-info", vec!["layer-neww".into()]).await;
            assert_eq!(result.status, Status::ExecutionError);
            assert!(result.message.unwrap().contains("layer-new"));
        }

        #[tokio::test]
        async fn test_proc_arg_and_val() {
            let session = session();
            let arg = ok(&session, "pdb-proc-arg", vec!["channel-new".into(), Value::Int32(5)]).await;
            assert_eq!(arg[0], Value::Int32(ArgType::Color.code() as i32));
            assert_eq!(arg[1], Value::String("color".into()));

            let val = ok(&session, "pdb-proc-val", vec!["image-new".into(), Value::Int32(0)]).await;
            assert_eq!(val[1], Value::String("image".into()));

            let result = session.execute("pdb-proc-val", vec!["image-new".into(), Value::Int32(1)]).await;
            assert_eq!(result.status, Status::ExecutionError);
        }
    }
}
