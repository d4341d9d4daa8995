//! End-to-end tests: images are written with [`ImageBuilder`], loaded against a scripted
//! dispatcher and run through the bootstrap.

use std::{fs, mem::size_of, path::PathBuf};

use forthboot::{
    engine::{go, EmergencyStacks},
    image::checksum::ChecksumStatus,
    prelude::*,
};

/// A dispatcher that runs a closure instead of threaded code.
struct Scripted {
    table: PrimitiveTable,
    strategy: DispatchStrategy,
    script: Box<dyn FnMut(MachineState) -> i32>,
    entries: Vec<MachineState>,
}

impl Scripted {
    fn new(strategy: DispatchStrategy) -> Self {
        let entries: Vec<usize> = (1..=16).map(|index| 0x7000_0000 + index * 0x40).collect();
        Scripted {
            table: PrimitiveTable::new(&entries).unwrap(),
            strategy,
            script: Box::new(|_| 0),
            entries: Vec::new(),
        }
    }

    fn script(mut self, script: impl FnMut(MachineState) -> i32 + 'static) -> Self {
        self.script = Box::new(script);
        self
    }
}

impl Engine for Scripted {
    fn primitives(&self) -> &PrimitiveTable {
        &self.table
    }

    fn strategy(&self) -> DispatchStrategy {
        self.strategy
    }

    fn dispatch(&mut self, state: MachineState) -> i32 {
        self.entries.push(state);
        (self.script)(state)
    }
}

fn word_at(address: usize) -> usize {
    // SAFETY: only called with addresses inside loaded regions
    unsafe { (address as *const usize).read_unaligned() }
}

/// A small colon definition with a constant, a variable, a does> word and a primitive call.
fn program() -> (ImageBuilder, [usize; 5]) {
    let mut builder = ImageBuilder::new().with_interpreter("/usr/local/bin/gforth");

    let constant = builder.push_code_field(CodeFieldKind::DoCon);
    builder.push_literal(42);

    let variable = builder.push_code_field(CodeFieldKind::DoVar);
    builder.push_null();

    let does_code = builder.here() + 2 * WORD;
    let defining = builder.push_behavior_extension(does_code);
    builder.push_primitive(11);

    let boot = builder.push_code_field(CodeFieldKind::DoCol);
    builder.push_offset(constant);
    builder.push_offset(variable);
    builder.push_primitive(8);

    let throw = builder.push_code_field(CodeFieldKind::DoCol);
    builder.push_primitive(9);

    builder.set_boot_entry(boot).set_throw_entry(throw);
    (builder, [constant, variable, defining, boot, throw])
}

#[test]
fn load_relocatable_program() -> Result<()> {
    let engine = Scripted::new(DispatchStrategy::Direct);
    let (builder, [constant, variable, defining, boot, throw]) = program();
    let config = Config::new();

    let image = ImageLoader::new(&config, &engine).load(&builder.build())?;
    let base = image.address();
    let table = engine.primitives();

    assert_eq!(word_at(base + constant), table.code_field(CodeFieldKind::DoCon));
    assert_eq!(word_at(base + constant + WORD), 42);
    assert_eq!(word_at(base + variable + WORD), 0);
    assert_eq!(word_at(base + defining), table.code_field(CodeFieldKind::DoDoes));
    assert_eq!(word_at(base + defining + WORD), base + defining + 2 * WORD);
    assert_eq!(word_at(base + boot + WORD), base + constant);
    assert_eq!(word_at(base + boot + 3 * WORD), table.entry(8).unwrap_or_default());

    assert_eq!(image.boot_entry(), base + boot);
    assert_eq!(image.throw_entry(), base + throw);

    let stats = image.relocation().copied().unwrap_or_default();
    assert_eq!(stats.behavior_extensions, 1);
    assert_eq!(stats.nulls, 1);
    assert_eq!(stats.primitives, 3);

    let header = image.resident_header()?;
    assert_eq!(header.checksum, DispatchStrategy::Direct.checksum(table));
    for kind in [StackKind::Data, StackKind::Float, StackKind::Return, StackKind::Locals] {
        assert_eq!(header.get(kind.base_field()), image.stack(kind).base());
        assert_eq!(header.get(kind.size_field()), image.stack(kind).len());
    }
    Ok(())
}

#[test]
fn indirect_threading_uses_table_slots() -> Result<()> {
    let engine = Scripted::new(DispatchStrategy::Indirect);
    let (builder, [_, _, _, boot, _]) = program();

    let image = ImageLoader::new(&Config::new(), &engine).load(&builder.build())?;
    let table = engine.primitives();

    assert_eq!(word_at(image.address() + boot), table.code_field(CodeFieldKind::DoCol));
    assert_eq!(
        word_at(image.address() + boot + 3 * WORD),
        table.slot_address(8).unwrap_or_default()
    );
    assert_eq!(image.header().checksum, table.base());
    Ok(())
}

#[test]
fn size_overrides_and_image_defaults() -> Result<()> {
    let engine = Scripted::new(DispatchStrategy::Direct);
    let (builder, _) = program();
    let config = Config::new().with_sizes(RegionSizes {
        return_stack: 64 * 1024,
        ..RegionSizes::default()
    });

    let image = ImageLoader::new(&config, &engine).load(&builder.build())?;
    assert_eq!(image.sizes().return_stack, 64 * 1024);
    assert_eq!(
        image.sizes().data_stack,
        forthboot::image::DEFAULT_SIZES.data_stack
    );
    assert!(image.stack(StackKind::Return).len() >= 64 * 1024);
    Ok(())
}

#[test]
fn checksum_stamp_then_verify() -> Result<()> {
    let engine = Scripted::new(DispatchStrategy::Direct);
    let (builder, _) = program();
    let fresh = ImageLoader::new(&Config::new(), &engine).load(&builder.build())?;
    let ChecksumStatus::Stamp(fingerprint) = fresh.checksum_status() else {
        panic!("fresh image was not stamped");
    };

    let stamped = builder.clone().with_checksum(fingerprint);
    let verified = ImageLoader::new(&Config::new(), &engine).load(&stamped.build())?;
    assert_eq!(verified.checksum_status(), ChecksumStatus::Verified);

    let foreign = builder.with_checksum(fingerprint ^ 1);
    match ImageLoader::new(&Config::new(), &engine).load(&foreign.build()) {
        Err(Error::IncompatibleImage { image, executable }) => {
            assert_eq!(image, fingerprint ^ 1);
            assert_eq!(executable, fingerprint);
        }
        other => panic!("unexpected result {other:?}"),
    }
    Ok(())
}

#[test]
fn rejects_foreign_platform() {
    let engine = Scripted::new(DispatchStrategy::Direct);
    let native = Descriptor::native();
    let foreign = Descriptor {
        little_endian: !native.little_endian,
        ..native
    };
    let (builder, _) = program();

    let result = ImageLoader::new(&Config::new(), &engine).load(&builder.with_descriptor(foreign).build());
    match result {
        Err(error @ Error::IncompatiblePlatform { .. }) => assert_eq!(error.exit_code(), 1),
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn rejects_non_images() {
    let engine = Scripted::new(DispatchStrategy::Direct);
    let loader_config = Config::new();
    let loader = ImageLoader::new(&loader_config, &engine);

    assert!(matches!(loader.load(b"#! /bin/sh\necho hello\n"), Err(Error::NotAnImage)));
    assert!(matches!(loader.load(&[]), Err(Error::NotAnImage)));
}

#[test]
fn rejects_misplaced_fixed_address_image() {
    let engine = Scripted::new(DispatchStrategy::Direct);
    let mut builder = ImageBuilder::new().with_base(0x1000);
    let boot = builder.push_literal(0);
    builder.set_boot_entry(boot);

    match ImageLoader::new(&Config::new(), &engine).load(&builder.build()) {
        Err(Error::NonRelocatableAddressMismatch { expected, actual }) => {
            assert_eq!(expected, 0x1000);
            assert_ne!(actual, 0x1000);
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn offset_image_shifts_dictionary() -> Result<()> {
    let engine = Scripted::new(DispatchStrategy::Direct);
    let (builder, _) = program();
    let bytes = builder.build();

    let plain = ImageLoader::new(&Config::new(), &engine).load(&bytes)?;
    let config = Config::new().with_offset_image(true).with_clear_dictionary(true);
    let shifted = ImageLoader::new(&config, &engine).load(&bytes)?;

    assert_eq!(shifted.head_size() - plain.head_size(), 56 * WORD);
    assert_eq!(shifted.bytes().len(), plain.bytes().len());
    Ok(())
}

#[test]
fn load_from_file() -> Result<()> {
    let dir = std::env::temp_dir().join(format!("forthboot-boot-{}", std::process::id()));
    fs::create_dir_all(&dir)?;
    let path: PathBuf = dir.join("kernel.fi");
    let (builder, [_, _, _, boot, _]) = program();
    fs::write(&path, builder.build())?;

    let engine = Scripted::new(DispatchStrategy::Direct);
    let image = ImageLoader::new(&Config::new(), &engine).load_file(&path)?;
    assert_eq!(image.boot_entry(), image.address() + boot);
    assert_eq!(image.head_size() % 8, 0);

    drop(image);
    fs::remove_dir_all(dir)?;
    Ok(())
}

#[test]
fn load_from_memory_source() -> Result<()> {
    let (builder, [_, _, _, boot, throw]) = program();
    let source = forthboot::file::from_mem(builder.build());

    let engine = Scripted::new(DispatchStrategy::DoublyIndirect);
    let image = ImageLoader::new(&Config::new(), &engine).load_backend(source.as_ref())?;
    assert_eq!(image.throw_entry() - image.boot_entry(), throw - boot);

    let sentinel = -2 - CodeFieldKind::DoCol.index() as isize;
    assert_eq!(word_at(image.address() + boot) as isize, sentinel);
    Ok(())
}

#[test]
fn boot_passes_arguments() -> Result<()> {
    let mut engine = Scripted::new(DispatchStrategy::Direct)
        .script(|state| (word_at(state.sp) * 10 + word_at(state.sp + WORD)) as i32);
    let (builder, _) = program();
    let config = Config::new();
    let mut image = ImageLoader::new(&config, &engine).load(&builder.build())?;

    let code = go(&mut engine, &mut image, &config, &[7, 3])?;
    assert_eq!(code, 73);
    assert_eq!(engine.entries.len(), 1);
    assert_eq!(engine.entries[0].ip, image.boot_entry());
    Ok(())
}

#[test]
fn fault_recovery_at_throw_entry() -> Result<()> {
    let mut engine = Scripted::new(DispatchStrategy::Direct).script(|state| {
        if state.lp != 0 {
            raise_fault(CapturedFault::new(FaultKind::InvalidMemoryAddress));
        }
        word_at(state.sp) as isize as i32
    });
    let (builder, _) = program();
    let config = Config::new();
    let mut image = ImageLoader::new(&config, &engine).load(&builder.build())?;

    let code = go(&mut engine, &mut image, &config, &[])?;
    assert_eq!(code, -9);
    assert_eq!(engine.entries.len(), 2);
    assert_eq!(engine.entries[1].ip, image.throw_entry());
    assert_eq!(engine.entries[1].fp % size_of::<f64>(), 0);
    Ok(())
}

#[test]
fn die_on_signal_reports_fault() -> Result<()> {
    let mut engine = Scripted::new(DispatchStrategy::Direct)
        .script(|_| raise_fault(CapturedFault::new(FaultKind::Alignment)));
    let (builder, _) = program();
    let config = Config::new().with_die_on_signal(true);
    let mut image = ImageLoader::new(&config, &engine).load(&builder.build())?;

    match go(&mut engine, &mut image, &config, &[]) {
        Err(Error::RuntimeFault { kind, code }) => {
            assert_eq!(kind, FaultKind::Alignment);
            assert_eq!(code, -23);
        }
        other => panic!("unexpected result {other:?}"),
    }
    Ok(())
}

#[test]
fn emergency_stacks_hold_throw_code() {
    let mut stacks = EmergencyStacks::new();
    let mut allocator = Allocator::with_policy(PlacementPolicy::HeapOnly);
    let mut return_stack = allocator.allocate(256).unwrap();

    let fault = CapturedFault::new(FaultKind::DivisionByZero);
    let state = stacks.prepare(&fault, None, &mut return_stack, 0x4000);
    assert_eq!(state.ip, 0x4000);
    assert_eq!(state.lp, 0);
    assert_eq!(word_at(state.sp) as isize, -10);
    assert_eq!(stacks.data()[7] as isize, -10);
}
