mod common;

use common::*;
use muzzle::check::*;
use muzzle::jvm::class_file::ClassFile;
use muzzle::jvm::class_graph::{ClassData, ClassGraph};
use muzzle::jvm::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags};
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const PAINT: &str = "(Lcom/acme/Canvas;)V";

fn advice_source() -> MemorySource {
    let advice = ClassAssembler::new("com/acme/agent/PaintAdvice", "java/lang/Object")
        .method(
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            "onEnter",
            "(Lcom/acme/Widget;Lcom/acme/Canvas;)V",
            |code| {
                code.line(20)
                    .op(ALOAD_0)
                    .op(ALOAD_1)
                    .invoke_virtual("com/acme/Widget", "paint", PAINT)
                    .op(RETURN);
            },
        )
        .assemble();
    MemorySource::new().with_class(name("com/acme/agent/PaintAdvice"), advice)
}

fn settings() -> Settings {
    Settings::new().with_internal_prefix("com.acme.agent.")
}

fn paint_module(config: &IntegrationConfig) -> InstrumentationModule {
    let descriptor = ModuleDescriptor::new("paint")
        .with_additional_name("widgets")
        .with_advice_class(name("com/acme/agent/PaintAdvice"));
    InstrumentationModule::new(descriptor, config)
}

fn config() -> IntegrationConfig {
    IntegrationConfig::new().without_environment()
}

fn canvas() -> Vec<u8> {
    ClassAssembler::new("com/acme/Canvas", "java/lang/Object").assemble()
}

fn widget(paint: Option<MethodAccessFlags>) -> Vec<u8> {
    let mut widget = ClassAssembler::new("com/acme/Widget", "java/lang/Object")
        .field(FieldAccessFlags::PRIVATE, "canvas", "Lcom/acme/Canvas;");
    if let Some(access_flags) = paint {
        widget = widget.method(access_flags, "paint", PAINT, |code| {
            code.op(RETURN);
        });
    }
    widget.assemble()
}

fn library(classes: Vec<(&str, Vec<u8>)>) -> Arc<dyn ClassLoadingContext> {
    let source = MemorySource::new();
    for (class_name, bytes) in classes {
        source.add_class(name(class_name), bytes);
    }
    Arc::new(ClassPath::new(source))
}

fn class_data(bytes: &[u8]) -> ClassData {
    let class_file = ClassFile::parse(bytes).unwrap();
    ClassData::from_class_file(&class_file).unwrap()
}

#[test]
fn contexts_get_their_own_verdicts() {
    init_logging();
    let gate = Gate::new(advice_source(), settings());
    let module = paint_module(&config());

    let public_paint = library(vec![
        ("com/acme/Widget", widget(Some(MethodAccessFlags::PUBLIC))),
        ("com/acme/Canvas", canvas()),
    ]);
    let protected_paint = library(vec![
        ("com/acme/Widget", widget(Some(MethodAccessFlags::PROTECTED))),
        ("com/acme/Canvas", canvas()),
    ]);
    let no_widget = library(vec![("com/acme/Canvas", canvas())]);

    assert!(gate.permits(&module, &public_paint));
    assert!(!gate.permits(&module, &protected_paint));
    assert!(!gate.permits(&module, &no_widget));

    assert!(gate.mismatches(&module, &*public_paint).unwrap().is_empty());

    let mismatches = gate.mismatches(&module, &*protected_paint).unwrap();
    assert_eq!(mismatches.len(), 1);
    match &mismatches[0].kind {
        MismatchKind::FlagMismatch {
            class_name,
            member,
            expected,
            found,
        } => {
            assert_eq!(class_name, &name("com/acme/Widget"));
            assert_eq!(member.as_deref(), Some("paint(Lcom/acme/Canvas;)V"));
            assert_eq!(*expected, Flags::PUBLIC | Flags::NON_STATIC);
            assert_eq!(*found, MethodAccessFlags::PROTECTED.bits());
        }
        other => panic!("unexpected mismatch {}", other),
    }
    assert_eq!(
        mismatches[0].sources.iter().map(ToString::to_string).collect::<Vec<_>>(),
        vec!["com.acme.agent.PaintAdvice", "com.acme.agent.PaintAdvice:20"]
    );

    let mismatches = gate.mismatches(&module, &*no_widget).unwrap();
    assert_eq!(
        mismatches.iter().map(|mismatch| mismatch.kind.clone()).collect::<Vec<_>>(),
        vec![MismatchKind::MissingClass {
            class_name: name("com/acme/Widget")
        }]
    );
}

#[test]
fn missing_method_is_reported_once() {
    let gate = Gate::new(advice_source(), settings());
    let module = paint_module(&config());
    let context = library(vec![
        ("com/acme/Widget", widget(None)),
        ("com/acme/Canvas", canvas()),
    ]);

    let mismatches = gate.mismatches(&module, &*context).unwrap();
    assert_eq!(mismatches.len(), 1);
    assert_eq!(
        mismatches[0].to_string(),
        "com.acme.agent.PaintAdvice,com.acme.agent.PaintAdvice:20 Missing method com.acme.Widget#paint(Lcom/acme/Canvas;)V"
    );
    assert!(!gate.permits(&module, &context));
}

#[test]
fn table_is_built_once_under_contention() {
    init_logging();
    let source = CountingSource::new(advice_source()).with_delay(Duration::from_millis(50));
    let settings = settings();
    let module = paint_module(&config());

    let tables: Vec<Arc<ReferenceTable>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| module.reference_table(&source, &settings).unwrap()))
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    assert_eq!(source.reads(), 1);
    for table in &tables {
        assert!(Arc::ptr_eq(table, &tables[0]));
    }
    assert!(tables[0].get(&name("com/acme/Widget")).is_some());
}

#[test]
fn failed_build_fails_closed() {
    init_logging();
    let gate = Gate::new(CountingSource::new(MemorySource::new()), settings());
    let module = paint_module(&config());
    let context = library(vec![]);

    assert!(!gate.permits(&module, &context));
    assert!(!gate.permits(&module, &library(vec![])));

    let first = gate.mismatches(&module, &*context).unwrap_err();
    let second = gate.mismatches(&module, &*context).unwrap_err();
    assert!(Arc::ptr_eq(&first, &second));
    match &*first {
        Error::Io { class, error } => {
            assert_eq!(class, &name("com/acme/agent/PaintAdvice"));
            assert_eq!(error.kind(), io::ErrorKind::NotFound);
        }
        other => panic!("unexpected error {}", other),
    }
}

#[test]
fn build_is_attempted_once() {
    let source = CountingSource::new(MemorySource::new());
    let settings = settings();
    let module = paint_module(&config());

    assert!(module.reference_table(&source, &settings).is_err());
    assert!(module.reference_table(&source, &settings).is_err());
    assert_eq!(source.reads(), 1);
}

#[test]
fn interrupted_reads_are_retried() {
    init_logging();
    let source = CountingSource::new(advice_source()).with_interruptions(1);
    let settings = settings();
    let module = paint_module(&config());

    let err = module.reference_table(&source, &settings).unwrap_err();
    match &*err {
        Error::Io { error, .. } => assert_eq!(error.kind(), io::ErrorKind::Interrupted),
        other => panic!("unexpected error {}", other),
    }
    assert!(!err.is_permanent());

    let table = module.reference_table(&source, &settings).unwrap();
    assert!(table.get(&name("com/acme/Widget")).is_some());
    assert_eq!(source.reads(), 2);

    let again = module.reference_table(&source, &settings).unwrap();
    assert!(Arc::ptr_eq(&table, &again));
    assert_eq!(source.reads(), 2);
}

#[test]
fn interrupted_reads_are_not_cached_as_verdicts() {
    init_logging();
    let source = Arc::new(CountingSource::new(advice_source()).with_interruptions(1));
    let gate = Gate::new(source.clone(), settings());
    let module = paint_module(&config());
    let context = library(vec![
        ("com/acme/Widget", widget(Some(MethodAccessFlags::PUBLIC))),
        ("com/acme/Canvas", canvas()),
    ]);

    let other = library(vec![
        ("com/acme/Widget", widget(Some(MethodAccessFlags::PUBLIC))),
        ("com/acme/Canvas", canvas()),
    ]);

    assert!(!gate.permits(&module, &context));
    assert!(gate.permits(&module, &context));
    assert!(gate.permits(&module, &other));
    assert_eq!(source.reads(), 2);
}

#[test]
fn modules_keep_the_table_of_their_first_gate() {
    let module = paint_module(&config());
    let first = Gate::new(advice_source(), settings());
    let table = first.reference_table(&module).unwrap();

    // A second gate over a source without the advice is never consulted
    let second = Gate::new(CountingSource::new(MemorySource::new()), settings());
    let reused = second.reference_table(&module).unwrap();
    assert!(Arc::ptr_eq(&table, &reused));
}

#[test]
fn disabled_modules_are_never_applied() {
    let gate = Gate::new(CountingSource::new(advice_source()), settings());
    let context = library(vec![
        ("com/acme/Widget", widget(Some(MethodAccessFlags::PUBLIC))),
        ("com/acme/Canvas", canvas()),
    ]);

    let disabled = paint_module(&config().with_property("dd.integration.widgets.enabled", "false"));
    assert!(!disabled.is_enabled());
    assert!(!gate.permits(&disabled, &context));

    let off_by_default = config().with_property("dd.integrations.enabled", "false");
    assert!(!paint_module(&off_by_default).is_enabled());
    let opted_in = paint_module(&off_by_default.with_property("dd.integration.paint.enabled", "TRUE"));
    assert!(opted_in.is_enabled());
    assert!(gate.permits(&opted_in, &context));
}

#[test]
fn verdicts_are_cached_per_context() {
    init_logging();
    let module = paint_module(&config());
    let graph = Arc::new(ClassGraph::new());
    graph.add_class(class_data(&canvas()));
    let context: Arc<dyn ClassLoadingContext> = graph.clone();

    let gate = Gate::new(advice_source(), settings());
    assert!(!gate.permits(&module, &context));

    // The context changes, the verdict does not
    graph.add_class(class_data(&widget(Some(MethodAccessFlags::PUBLIC))));
    assert!(!gate.permits(&module, &context));

    let mut uncached = settings();
    uncached.cache_verdicts = false;
    let uncached = Gate::new(advice_source(), uncached);
    assert!(uncached.permits(&module, &context));

    // A different context with the same classes gets its own verdict
    let other = Arc::new(ClassGraph::new());
    other.add_class(class_data(&canvas()));
    other.add_class(class_data(&widget(Some(MethodAccessFlags::PUBLIC))));
    let other: Arc<dyn ClassLoadingContext> = other;
    assert!(gate.permits(&module, &other));

    let weak = Arc::downgrade(&context);
    drop(context);
    drop(graph);
    assert!(weak.upgrade().is_none());
}

#[test]
fn final_classes_cannot_be_extended() {
    let helper = ClassAssembler::new("com/acme/agent/TracingWidget", "com/acme/Widget").assemble();
    let advice = ClassAssembler::new("com/acme/agent/TracingAdvice", "java/lang/Object")
        .method(MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC, "wrap", "()V", |code| {
            code.new_object("com/acme/agent/TracingWidget").op(POP).op(RETURN);
        })
        .assemble();
    let source = MemorySource::new()
        .with_class(name("com/acme/agent/TracingWidget"), helper)
        .with_class(name("com/acme/agent/TracingAdvice"), advice);
    let descriptor = ModuleDescriptor::new("tracing")
        .with_advice_class(name("com/acme/agent/TracingAdvice"))
        .with_helper_class(name("com/acme/agent/TracingWidget"));
    let module = InstrumentationModule::new(descriptor, &config());
    let gate = Gate::new(source, settings());

    let final_widget = ClassAssembler::new("com/acme/Widget", "java/lang/Object")
        .access_flags(ClassAccessFlags::PUBLIC | ClassAccessFlags::FINAL)
        .assemble();
    let open_widget = ClassAssembler::new("com/acme/Widget", "java/lang/Object").assemble();

    let mismatches = gate
        .mismatches(&module, &*library(vec![("com/acme/Widget", final_widget)]))
        .unwrap();
    assert_eq!(mismatches.len(), 1);
    assert!(matches!(
        &mismatches[0].kind,
        MismatchKind::FlagMismatch { member: None, .. }
    ));
    assert!(gate.permits(&module, &library(vec![("com/acme/Widget", open_widget)])));
}
