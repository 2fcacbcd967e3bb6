#![allow(dead_code)]

use muzzle::check::ClassFileSource;
use muzzle::jvm::class_file::*;
use muzzle::jvm::*;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn name(name: &str) -> BinaryName {
    BinaryName::from_source_name(name).unwrap()
}

pub fn member(name: &str) -> UnqualifiedName {
    UnqualifiedName::from_string(name.to_owned()).unwrap()
}

/// Builds real class files, one member at a time
pub struct ClassAssembler {
    constants: ConstantsPool,
    access_flags: ClassAccessFlags,
    this_class: ClassConstantIndex,
    super_class: ClassConstantIndex,
    interfaces: Vec<ClassConstantIndex>,
    fields: Vec<Field>,
    methods: Vec<Method>,
    bootstrap_methods: Vec<BootstrapMethod>,
}

impl ClassAssembler {
    /// Public class with a superclass
    pub fn new(name: &str, super_name: &str) -> ClassAssembler {
        let mut constants = ConstantsPool::new();
        let this_class = constants.get_class(name).unwrap();
        let super_class = constants.get_class(super_name).unwrap();
        ClassAssembler {
            constants,
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            this_class,
            super_class,
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            bootstrap_methods: vec![],
        }
    }

    pub fn access_flags(mut self, access_flags: ClassAccessFlags) -> ClassAssembler {
        self.access_flags = access_flags;
        self
    }

    pub fn interface(mut self, name: &str) -> ClassAssembler {
        let interface = self.constants.get_class(name).unwrap();
        self.interfaces.push(interface);
        self
    }

    pub fn field(mut self, access_flags: FieldAccessFlags, name: &str, descriptor: &str) -> ClassAssembler {
        let field = Field {
            access_flags,
            name_index: self.constants.get_utf8(name).unwrap(),
            descriptor_index: self.constants.get_utf8(descriptor).unwrap(),
            attributes: vec![],
        };
        self.fields.push(field);
        self
    }

    /// Method with no code
    pub fn abstract_method(mut self, access_flags: MethodAccessFlags, name: &str, descriptor: &str) -> ClassAssembler {
        let method = Method {
            access_flags: access_flags | MethodAccessFlags::ABSTRACT,
            name_index: self.constants.get_utf8(name).unwrap(),
            descriptor_index: self.constants.get_utf8(descriptor).unwrap(),
            attributes: vec![],
        };
        self.methods.push(method);
        self
    }

    /// Method whose code is written by `body`
    pub fn method<F>(mut self, access_flags: MethodAccessFlags, name: &str, descriptor: &str, body: F) -> ClassAssembler
    where
        F: FnOnce(&mut CodeAssembler),
    {
        let name_index = self.constants.get_utf8(name).unwrap();
        let descriptor_index = self.constants.get_utf8(descriptor).unwrap();

        let mut code = CodeAssembler {
            constants: &mut self.constants,
            bootstrap_methods: &mut self.bootstrap_methods,
            code: vec![],
            lines: vec![],
            handlers: vec![],
        };
        body(&mut code);
        let CodeAssembler {
            code,
            lines,
            handlers,
            ..
        } = code;

        let line_numbers = self.constants.get_attribute(LineNumberTable(lines)).unwrap();
        let code = Code {
            max_stack: 16,
            max_locals: 16,
            code_array: BytecodeArray(code),
            exception_table: handlers,
            attributes: vec![line_numbers],
        };
        let code = self.constants.get_attribute(code).unwrap();
        self.methods.push(Method {
            access_flags,
            name_index,
            descriptor_index,
            attributes: vec![code],
        });
        self
    }

    pub fn assemble(mut self) -> Vec<u8> {
        let mut attributes = vec![];
        if !self.bootstrap_methods.is_empty() {
            let bootstrap_methods = BootstrapMethods(self.bootstrap_methods);
            attributes.push(self.constants.get_attribute(bootstrap_methods).unwrap());
        }
        let class_file = ClassFile {
            version: Version::JAVA8,
            constants: self.constants.into_offset_vec(),
            access_flags: self.access_flags,
            this_class: self.this_class,
            super_class: self.super_class,
            interfaces: self.interfaces,
            fields: self.fields,
            methods: self.methods,
            attributes,
        };
        let mut bytes = vec![];
        class_file.serialize(&mut bytes).unwrap();
        bytes
    }
}

pub struct CodeAssembler<'a> {
    constants: &'a mut ConstantsPool,
    bootstrap_methods: &'a mut Vec<BootstrapMethod>,
    code: Vec<u8>,
    lines: Vec<LineNumber>,
    handlers: Vec<ExceptionHandler>,
}

pub const ALOAD_0: u8 = 0x2a;
pub const ALOAD_1: u8 = 0x2b;
pub const ACONST_NULL: u8 = 0x01;
pub const ICONST_1: u8 = 0x04;
pub const POP: u8 = 0x57;
pub const RETURN: u8 = 0xb1;
pub const ARETURN: u8 = 0xb0;
pub const ATHROW: u8 = 0xbf;

impl<'a> CodeAssembler<'a> {
    fn pc(&self) -> u16 {
        self.code.len() as u16
    }

    fn index(&mut self, opcode: u8, index: impl Into<ConstantIndex>) -> &mut Self {
        let index: ConstantIndex = index.into();
        self.code.push(opcode);
        self.code.extend_from_slice(&index.0.to_be_bytes());
        self
    }

    /// Instructions from here on are on this source line
    pub fn line(&mut self, line_number: u16) -> &mut Self {
        self.lines.push(LineNumber {
            start_pc: BytecodeIndex(self.pc()),
            line_number,
        });
        self
    }

    /// Instruction with no operands
    pub fn op(&mut self, opcode: u8) -> &mut Self {
        self.code.push(opcode);
        self
    }

    pub fn get_static(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        let field = self.constants.get_field_ref(owner, name, descriptor).unwrap();
        self.index(0xb2, field)
    }

    pub fn put_static(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        let field = self.constants.get_field_ref(owner, name, descriptor).unwrap();
        self.index(0xb3, field)
    }

    pub fn get_field(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        let field = self.constants.get_field_ref(owner, name, descriptor).unwrap();
        self.index(0xb4, field)
    }

    pub fn put_field(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        let field = self.constants.get_field_ref(owner, name, descriptor).unwrap();
        self.index(0xb5, field)
    }

    pub fn invoke_virtual(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        let method = self.constants.get_method_ref(owner, name, descriptor, false).unwrap();
        self.index(0xb6, method)
    }

    pub fn invoke_special(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        let method = self.constants.get_method_ref(owner, name, descriptor, false).unwrap();
        self.index(0xb7, method)
    }

    pub fn invoke_static(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        let method = self.constants.get_method_ref(owner, name, descriptor, false).unwrap();
        self.index(0xb8, method)
    }

    pub fn invoke_interface(&mut self, owner: &str, name: &str, descriptor: &str, count: u8) -> &mut Self {
        let method = self.constants.get_method_ref(owner, name, descriptor, true).unwrap();
        self.index(0xb9, method);
        self.code.extend_from_slice(&[count, 0]);
        self
    }

    /// `invokedynamic` whose bootstrap is a static method taking the given extra arguments
    pub fn invoke_dynamic(
        &mut self,
        bootstrap: (&str, &str, &str),
        arguments: Vec<ConstantIndex>,
        name: &str,
        descriptor: &str,
    ) -> &mut Self {
        let (owner, bootstrap_name, bootstrap_descriptor) = bootstrap;
        let method = self
            .constants
            .get_method_ref(owner, bootstrap_name, bootstrap_descriptor, false)
            .unwrap();
        let handle = self
            .constants
            .get_method_handle(HandleKind::InvokeStatic, method.into())
            .unwrap();
        let bootstrap_index = self.bootstrap_methods.len() as u16;
        self.bootstrap_methods.push(BootstrapMethod {
            bootstrap_method: handle,
            bootstrap_arguments: arguments,
        });
        let call_site = self
            .constants
            .get_invoke_dynamic(bootstrap_index, name, descriptor)
            .unwrap();
        self.index(0xba, call_site);
        self.code.extend_from_slice(&[0, 0]);
        self
    }

    /// Another `invokedynamic` call site for an already declared bootstrap method
    pub fn invoke_dynamic_again(&mut self, bootstrap_index: u16, name: &str, descriptor: &str) -> &mut Self {
        let call_site = self
            .constants
            .get_invoke_dynamic(bootstrap_index, name, descriptor)
            .unwrap();
        self.index(0xba, call_site);
        self.code.extend_from_slice(&[0, 0]);
        self
    }

    pub fn new_object(&mut self, class: &str) -> &mut Self {
        let class = self.constants.get_class(class).unwrap();
        self.index(0xbb, class)
    }

    pub fn anewarray(&mut self, class: &str) -> &mut Self {
        let class = self.constants.get_class(class).unwrap();
        self.index(0xbd, class)
    }

    pub fn checkcast(&mut self, class: &str) -> &mut Self {
        let class = self.constants.get_class(class).unwrap();
        self.index(0xc0, class)
    }

    pub fn instanceof(&mut self, class: &str) -> &mut Self {
        let class = self.constants.get_class(class).unwrap();
        self.index(0xc1, class)
    }

    pub fn multianewarray(&mut self, class: &str, dimensions: u8) -> &mut Self {
        let class = self.constants.get_class(class).unwrap();
        self.index(0xc5, class);
        self.code.push(dimensions);
        self
    }

    /// `ldc_w` of any loadable constant
    pub fn ldc(&mut self, constant: ConstantIndex) -> &mut Self {
        self.index(0x13, constant)
    }

    pub fn class_constant(&mut self, class: &str) -> ConstantIndex {
        self.constants.get_class(class).unwrap().into()
    }

    pub fn method_type_constant(&mut self, descriptor: &str) -> ConstantIndex {
        self.constants.get_method_type(descriptor).unwrap()
    }

    pub fn field_handle(&mut self, kind: HandleKind, owner: &str, name: &str, descriptor: &str) -> ConstantIndex {
        let field = self.constants.get_field_ref(owner, name, descriptor).unwrap();
        self.constants.get_method_handle(kind, field.into()).unwrap()
    }

    pub fn method_handle(
        &mut self,
        kind: HandleKind,
        owner: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> ConstantIndex {
        let method = self
            .constants
            .get_method_ref(owner, name, descriptor, is_interface)
            .unwrap();
        self.constants.get_method_handle(kind, method.into()).unwrap()
    }

    /// Exception handler covering everything so far, starting at the current instruction
    pub fn catch(&mut self, class: &str) -> &mut Self {
        let catch_type = self.constants.get_class(class).unwrap();
        self.handlers.push(ExceptionHandler {
            start_pc: BytecodeIndex(0),
            end_pc: BytecodeIndex(self.pc()),
            handler_pc: BytecodeIndex(self.pc()),
            catch_type,
        });
        self
    }
}

/// Class file source that counts (and slows down, or interrupts) reads
pub struct CountingSource<S> {
    inner: S,
    reads: AtomicUsize,
    delay: Duration,
    interrupted: AtomicUsize,
}

impl<S: ClassFileSource> CountingSource<S> {
    pub fn new(inner: S) -> CountingSource<S> {
        CountingSource {
            inner,
            reads: AtomicUsize::new(0),
            delay: Duration::ZERO,
            interrupted: AtomicUsize::new(0),
        }
    }

    /// Fail the next `count` reads with [`io::ErrorKind::Interrupted`]
    pub fn with_interruptions(self, count: usize) -> CountingSource<S> {
        self.interrupted.store(count, Ordering::SeqCst);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> CountingSource<S> {
        self.delay = delay;
        self
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl<S: ClassFileSource> ClassFileSource for CountingSource<S> {
    fn read_class(&self, name: &BinaryName) -> io::Result<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        let interrupt = self
            .interrupted
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if interrupt {
            return Err(io::Error::new(io::ErrorKind::Interrupted, "read interrupted"));
        }
        self.inner.read_class(name)
    }
}
