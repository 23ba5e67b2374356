//! Wires a recorder, a dispatcher and a few consumers together.
//!
//! Run with `RUST_LOG=scene_notify=trace` to see the dispatch trace.
use scene_notify::scene_model::{ChangeRecorder, LinkDescriptor, MultiplexedRecorder, ObjectId, PropertyPath, RecordChanges};
use scene_notify::{ChangeDispatcher, DispatcherConfig, Subscription};
use std::cell::RefCell;
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

/// Stand-in for an editor view showing the properties of one object.
struct PropertyPanel {
    _subscriptions: Subscription,
}

impl PropertyPanel {
    fn new(dispatcher: &ChangeDispatcher, object: ObjectId) -> PropertyPanel {
        let root = PropertyPath::root(object.clone());
        let mut subscriptions = dispatcher.register_on_children(root.clone(), |path| {
            println!("[panel] refresh {path}");
        });
        subscriptions.push(dispatcher.register_on_error_changed(root, move || {
            println!("[panel] error state of {object} changed");
        }));
        PropertyPanel {
            _subscriptions: subscriptions,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = DispatcherConfig::from_json(r#"{ "leak_check": "assert", "trace_targets": true }"#)?;
    let dispatcher = ChangeDispatcher::with_config(config);

    // the undo stack and the UI both observe mutations
    let ui_changes = Rc::new(RefCell::new(ChangeRecorder::new()));
    let undo_changes = Rc::new(RefCell::new(ChangeRecorder::new()));
    let mut recorder = MultiplexedRecorder::new();
    recorder.add_recorder(ui_changes.clone());
    recorder.add_recorder(undo_changes.clone());

    dispatcher.register_bulk_change_callback(|objects| {
        let names: Vec<&str> = objects.iter().map(ObjectId::as_str).collect();
        println!("[renderer] sync {}", names.join(", "));
    });

    let mut subscriptions = dispatcher.register_on_objects_lifecycle(
        |object| println!("[outline] add {object}"),
        |object| println!("[outline] remove {object}"),
    );
    subscriptions.push(dispatcher.register_on_links_lifecycle(
        |link| println!("[graph] link {link}"),
        |link| println!("[graph] unlink {link}"),
    ));
    subscriptions.push(dispatcher.register_on_undo_changed(|| println!("[menu] undo stack changed")));
    subscriptions.push(dispatcher.register_on_after_dispatch(|| println!("[status] done")));

    let sphere: ObjectId = "sphere".parse()?;
    let material: ObjectId = "material".parse()?;
    let panel = PropertyPanel::new(&dispatcher, sphere.clone());

    recorder.record_create_object(&sphere);
    recorder.record_create_object(&material);
    recorder.record_value_changed(&"sphere.radius".parse::<PropertyPath>()?);
    recorder.record_add_link(&LinkDescriptor::new(
        "material.color".parse::<PropertyPath>()?,
        "sphere.color".parse::<PropertyPath>()?,
    ));
    recorder.record_error_changed(&PropertyPath::root(sphere.clone()));
    dispatcher.set_undo_changed();

    let batch = ui_changes.borrow_mut().release();
    dispatcher.dispatch(&batch);

    recorder.record_delete_object(&material);
    recorder.record_preview_dirty(&sphere);
    let batch = ui_changes.borrow_mut().release();
    dispatcher.dispatch(&batch);

    println!("undo stack saw {} created object(s)", undo_changes.borrow().created_objects().len());

    drop(panel);
    drop(subscriptions);
    dispatcher.reset_bulk_change_callback();
    dispatcher.check_empty()?;
    Ok(())
}
