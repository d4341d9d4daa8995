//! Image loading.
//!
//! [`ImageLoader`] turns an image file into a resident, relocated [`Image`] with all of its
//! working memory in place. Loading runs as a straight sequence of steps, and any failure aborts
//! the whole load:
//!
//! 1. scan for the magic and check the platform descriptor
//! 2. read the header and resolve region sizes against the configured overrides
//! 3. place the dictionary and copy preamble, header and dictionary contents into it
//! 4. relocate a position-independent image, or check a fixed-address image's placement
//! 5. stamp or verify the executable fingerprint
//! 6. allocate the four stacks and record their bases in the resident header
//! 7. make the image coherent for instruction fetch
//!
//! # Example
//!
//! ```rust,no_run
//! use forthboot::{config::Config, engine::Engine, image::ImageLoader};
//!
//! fn boot(engine: &impl Engine) -> forthboot::Result<()> {
//!     let config = Config::new();
//!     let image = ImageLoader::new(&config, engine).load_file("forth.fi")?;
//!     println!("image resident at ${:x}", image.address());
//!     Ok(())
//! }
//! ```

use std::path::Path;

use strum::{Display, EnumCount, EnumIter, IntoEnumIterator};

use crate::{
    config::{Config, RegionSizes},
    engine::{DispatchStrategy, Engine, PrimitiveTable},
    file::{self, parser::Parser, Backend},
    image::{
        checksum::{reconcile, ChecksumStatus},
        header::{write_field, HeaderField, ImageHeader, HEADER_SIZE},
        magic,
        relocate::{RelocationStats, Relocator},
        sizer::resolve_sizes,
    },
    memory::{flush_icache, Allocator, PlacementPolicy, Region},
    Error, Result,
};

/// The four stacks, in header order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumCount, EnumIter)]
pub enum StackKind {
    /// Data stack
    Data,
    /// Floating-point stack
    Float,
    /// Return stack
    Return,
    /// Locals stack
    Locals,
}

impl StackKind {
    /// Header field holding this stack's base address.
    #[must_use]
    pub fn base_field(self) -> HeaderField {
        match self {
            StackKind::Data => HeaderField::DataStackBase,
            StackKind::Float => HeaderField::FpStackBase,
            StackKind::Return => HeaderField::ReturnStackBase,
            StackKind::Locals => HeaderField::LocalsStackBase,
        }
    }

    /// Header field holding this stack's size.
    #[must_use]
    pub fn size_field(self) -> HeaderField {
        match self {
            StackKind::Data => HeaderField::DataStackSize,
            StackKind::Float => HeaderField::FpStackSize,
            StackKind::Return => HeaderField::ReturnStackSize,
            StackKind::Locals => HeaderField::LocalsStackSize,
        }
    }

    fn size(self, sizes: &RegionSizes) -> usize {
        match self {
            StackKind::Data => sizes.data_stack,
            StackKind::Float => sizes.fp_stack,
            StackKind::Return => sizes.return_stack,
            StackKind::Locals => sizes.locals_stack,
        }
    }
}

/// A loaded, relocated image together with its working memory.
///
/// The image lives at [`Image::address`], past the preamble (and the offset-image shift) inside
/// the dictionary region. All memory is released when the image is dropped.
#[derive(Debug)]
pub struct Image {
    dictionary: Region,
    stacks: [Region; StackKind::COUNT],
    image_offset: usize,
    preamble_size: usize,
    header: ImageHeader,
    relocation: Option<RelocationStats>,
    checksum: ChecksumStatus,
}

impl Image {
    /// Address of the resident header, the start of the image proper.
    #[must_use]
    pub fn address(&self) -> usize {
        self.dictionary.base() + self.image_offset + self.preamble_size
    }

    /// The header as it was left by the loader: relocated entries, resolved sizes, stack bases.
    #[must_use]
    pub fn header(&self) -> &ImageHeader {
        &self.header
    }

    /// Reads the header back from resident memory.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if the dictionary cannot hold a header.
    pub fn resident_header(&self) -> Result<ImageHeader> {
        ImageHeader::from_bytes(self.bytes())
    }

    /// Region sizes the image was loaded with.
    #[must_use]
    pub fn sizes(&self) -> &RegionSizes {
        &self.header.sizes
    }

    /// Instruction pointer threaded code starts at.
    #[must_use]
    pub fn boot_entry(&self) -> usize {
        self.header.boot_entry
    }

    /// Instruction pointer threaded code resumes at after a fault.
    #[must_use]
    pub fn throw_entry(&self) -> usize {
        self.header.throw_entry
    }

    /// The image proper, `image_size` bytes from the header on.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        let start = self.image_offset + self.preamble_size;
        &self.dictionary.as_slice()[start..start + self.header.image_size]
    }

    /// The whole dictionary region, preamble and offset shift included.
    #[must_use]
    pub fn dictionary(&self) -> &Region {
        &self.dictionary
    }

    /// Bytes between the dictionary region's start and the image proper.
    #[must_use]
    pub fn head_size(&self) -> usize {
        self.image_offset + self.preamble_size
    }

    /// One of the four stacks.
    #[must_use]
    pub fn stack(&self, kind: StackKind) -> &Region {
        &self.stacks[kind as usize]
    }

    /// One of the four stacks, mutably.
    pub fn stack_mut(&mut self, kind: StackKind) -> &mut Region {
        &mut self.stacks[kind as usize]
    }

    /// What relocation did, `None` for a fixed-address image.
    #[must_use]
    pub fn relocation(&self) -> Option<&RelocationStats> {
        self.relocation.as_ref()
    }

    /// Whether the fingerprint was stamped or verified.
    #[must_use]
    pub fn checksum_status(&self) -> ChecksumStatus {
        self.checksum
    }
}

/// Loads images for one dispatcher under one configuration.
pub struct ImageLoader<'a> {
    config: &'a Config,
    table: &'a PrimitiveTable,
    strategy: DispatchStrategy,
}

impl<'a> ImageLoader<'a> {
    /// Creates a loader resolving against `engine`'s primitive table.
    #[must_use]
    pub fn new<E: Engine + ?Sized>(config: &'a Config, engine: &'a E) -> Self {
        ImageLoader {
            config,
            table: engine.primitives(),
            strategy: engine.strategy(),
        }
    }

    /// Creates a loader from a table and strategy directly.
    #[must_use]
    pub fn with_table(
        config: &'a Config,
        table: &'a PrimitiveTable,
        strategy: DispatchStrategy,
    ) -> Self {
        ImageLoader {
            config,
            table,
            strategy,
        }
    }

    /// Loads the image file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] if the file cannot be opened, otherwise the errors of
    /// [`ImageLoader::load`].
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Image> {
        let path = path.as_ref();
        let source = file::open(path)?;
        log::debug!("Opened image file: {}", path.display());
        self.load_backend(source.as_ref())
    }

    /// Loads an image from any byte source.
    ///
    /// # Errors
    ///
    /// See [`ImageLoader::load`].
    pub fn load_backend(&self, source: &dyn Backend) -> Result<Image> {
        self.load(source.data())
    }

    /// Loads an image from its serialised bytes.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::NotAnImage`] if no signature is found
    /// - [`crate::Error::IncompatiblePlatform`] if the image was built for another machine
    /// - [`crate::Error::OutOfBounds`] if the data ends inside the header, body or bitmap
    /// - [`crate::Error::Malformed`] if the image does not fit its dictionary or cannot be
    ///   relocated against this executable
    /// - [`crate::Error::NonRelocatableAddressMismatch`] if a fixed-address image cannot be
    ///   placed at its address
    /// - [`crate::Error::IncompatibleImage`] if the stored fingerprint differs
    /// - [`crate::Error::AllocationFailure`] if working memory cannot be obtained
    pub fn load(&self, data: &[u8]) -> Result<Image> {
        let mut parser = Parser::new(data);

        let found = magic::scan(&mut parser)?;
        magic::check_platform(found.descriptor)?;

        let header = ImageHeader::read(&mut parser)?;
        let sizes = resolve_sizes(&self.config.sizes, &header.sizes);
        log::debug!("region sizes: {sizes}");

        if header.image_size < HEADER_SIZE {
            return Err(malformed_error!(
                "Image size {} is smaller than its header",
                header.image_size
            ));
        }
        if header.image_size > sizes.dictionary {
            return Err(malformed_error!(
                "Image of {} bytes does not fit a dictionary of {} bytes",
                header.image_size,
                sizes.dictionary
            ));
        }

        let mut allocator = Allocator::new();
        let image_offset = self.config.image_offset();
        let preamble_size = found.preamble_size;
        let head_size = image_offset + preamble_size;

        let dictionary_policy = if self.strategy.requires_heap_dictionary() {
            PlacementPolicy::HeapOnly
        } else {
            allocator.policy()
        };
        let dictionary_size = head_size
            .checked_add(sizes.dictionary)
            .ok_or_else(|| Error::AllocationFailure {
                size: sizes.dictionary,
                reason: "dictionary size overflows the address space".to_string(),
            })?;
        let mut dictionary = allocator.allocate_with(dictionary_size, dictionary_policy)?;

        let address = dictionary.base() + head_size;
        // image_size <= dictionary, so neither end overflows
        let image_end = head_size + header.image_size;

        parser.seek(0)?;
        let contents = parser.read_bytes(preamble_size + header.image_size)?;
        let memory = dictionary.as_mut_slice();
        if self.config.clear_dictionary {
            memory[image_offset..].fill(0);
        }
        memory[image_offset..image_end].copy_from_slice(contents);

        let image = &mut memory[head_size..image_end];

        let relocation = if header.base == 0 {
            let bitmap = parser.read_bytes(header.bitmap_size())?;
            let stats = Relocator::new(self.table, self.strategy).relocate(image, bitmap, address)?;
            log::debug!(
                "relocated {} words at ${:x}: {} offsets, {} code fields, {} primitives",
                stats.total(),
                address,
                stats.offsets,
                stats.code_fields + stats.behavior_extensions,
                stats.primitives
            );
            Some(stats)
        } else if header.base != address {
            return Err(Error::NonRelocatableAddressMismatch {
                expected: header.base,
                actual: address,
            });
        } else {
            None
        };

        let checksum = reconcile(header.checksum, self.strategy.checksum(self.table))?;
        if let ChecksumStatus::Stamp(fingerprint) = checksum {
            write_field(image, HeaderField::Checksum, fingerprint)?;
        }

        write_field(image, HeaderField::DictSize, sizes.dictionary)?;
        let mut stacks = Vec::with_capacity(StackKind::COUNT);
        for kind in StackKind::iter() {
            let size = kind.size(&sizes);
            let region = allocator.allocate(size)?;
            log::debug!("{kind} stack at ${:x}, {size:#x} bytes", region.base());
            write_field(image, kind.size_field(), size)?;
            write_field(image, kind.base_field(), region.base())?;
            stacks.push(region);
        }
        let Ok(stacks) = <[Region; StackKind::COUNT]>::try_from(stacks) else {
            return Err(Error::Error("stack allocation incomplete".to_string()));
        };

        flush_icache(address, header.image_size);

        let header = ImageHeader::from_bytes(image)?;
        Ok(Image {
            dictionary,
            stacks,
            image_offset,
            preamble_size,
            header,
            relocation,
            checksum,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        engine::CodeFieldKind,
        file::io::{read_word, WORD},
        image::{header::HEADER_WORDS, ImageBuilder},
        test::{table_factory, MockEngine},
        utils::MAX_ALIGN,
    };

    fn word(image: &Image, offset: usize) -> usize {
        read_word(image.bytes(), offset / WORD).unwrap() as usize
    }

    #[test]
    fn relocatable_image() {
        let engine = MockEngine::new(DispatchStrategy::Direct);
        let mut builder = ImageBuilder::new().with_interpreter("/usr/bin/gforth");
        let boot = builder.push_code_field(CodeFieldKind::DoCol);
        let primitive = builder.push_primitive(9);
        let reference = builder.push_offset(primitive);
        let null = builder.push_null();
        let literal = builder.push_literal(-77);
        let does = builder.push_behavior_extension(boot);
        let throw = builder.push_code_field(CodeFieldKind::DoCol);
        builder.set_boot_entry(boot).set_throw_entry(throw);

        let config = Config::new();
        let image = ImageLoader::new(&config, &engine).load(&builder.build()).unwrap();
        let table = engine.primitives();
        let base = image.address();

        assert_eq!(word(&image, boot), table.code_field(CodeFieldKind::DoCol));
        assert_eq!(word(&image, primitive), table.entry(9).unwrap());
        assert_eq!(word(&image, reference), base + primitive);
        assert_eq!(word(&image, null), 0);
        assert_eq!(word(&image, literal) as isize, -77);
        assert_eq!(word(&image, does), table.code_field(CodeFieldKind::DoDoes));
        assert_eq!(word(&image, does + WORD), base + boot);

        assert_eq!(image.boot_entry(), base + boot);
        assert_eq!(image.throw_entry(), base + throw);
        assert_eq!(image.header().base, 0);
        assert_eq!(image.relocation().map(RelocationStats::total), Some(8));
    }

    #[test]
    fn stacks_and_sizes_recorded() {
        let engine = MockEngine::new(DispatchStrategy::Indirect);
        let mut builder = ImageBuilder::new();
        builder.push_literal(0);

        let config = Config::new().with_sizes(RegionSizes {
            return_stack: 1001,
            ..RegionSizes::default()
        });
        let image = ImageLoader::new(&config, &engine).load(&builder.build()).unwrap();

        let header = image.resident_header().unwrap();
        assert_eq!(&header, image.header());
        assert_eq!(header.sizes.return_stack % MAX_ALIGN, 0);
        assert!(header.sizes.return_stack >= 1001);
        for kind in StackKind::iter() {
            let stack = image.stack(kind);
            assert_eq!(header.get(kind.base_field()), stack.base());
            assert_eq!(header.get(kind.size_field()), stack.len());
        }
        assert!(image.dictionary().len() >= image.head_size() + header.sizes.dictionary);
    }

    #[test]
    fn checksum_stamped_then_verified() {
        let engine = MockEngine::new(DispatchStrategy::Direct);
        let config = Config::new();
        let loader = ImageLoader::new(&config, &engine);
        let expected = DispatchStrategy::Direct.checksum(engine.primitives());

        let mut builder = ImageBuilder::new();
        builder.push_primitive(8);
        let image = loader.load(&builder.build()).unwrap();
        assert_eq!(image.checksum_status(), ChecksumStatus::Stamp(expected));
        assert_eq!(image.header().checksum, expected);

        let stamped = builder.clone().with_checksum(image.header().checksum);
        let again = loader.load(&stamped.build()).unwrap();
        assert_eq!(again.checksum_status(), ChecksumStatus::Verified);

        let foreign = builder.with_checksum(expected ^ 0x5a5a);
        match loader.load(&foreign.build()) {
            Err(Error::IncompatibleImage { image, executable }) => {
                assert_eq!(image, expected ^ 0x5a5a);
                assert_eq!(executable, expected);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn offset_and_clear_dictionary() {
        let engine = MockEngine::new(DispatchStrategy::Direct);
        let mut builder = ImageBuilder::new();
        let at = builder.push_offset(0);

        let plain = Config::new();
        let shifted = Config::new()
            .with_offset_image(true)
            .with_clear_dictionary(true);
        let bytes = builder.build();

        let image = ImageLoader::new(&plain, &engine).load(&bytes).unwrap();
        assert_eq!(image.head_size(), 8);

        let image = ImageLoader::new(&shifted, &engine).load(&bytes).unwrap();
        assert_eq!(image.head_size(), 56 * WORD + 8);
        assert_eq!(image.address(), image.dictionary().base() + 56 * WORD + 8);
        assert_eq!(word(&image, at), image.address());

        let dictionary = image.dictionary().as_slice();
        let tail = image.head_size() + image.header().image_size;
        assert!(dictionary[tail..].iter().all(|&byte| byte == 0));
    }

    #[test]
    fn oversized_dictionary_override() {
        let engine = MockEngine::new(DispatchStrategy::Direct);
        let mut builder = ImageBuilder::new();
        builder.push_literal(1);
        let bytes = builder.build();

        let sizes = RegionSizes {
            dictionary: usize::MAX - 3,
            ..RegionSizes::default()
        };
        for config in [
            Config::new().with_sizes(sizes),
            Config::new().with_sizes(sizes).with_offset_image(true),
        ] {
            match ImageLoader::new(&config, &engine).load(&bytes) {
                Err(Error::AllocationFailure { .. }) => {}
                other => panic!("unexpected result {other:?}"),
            }
        }
    }

    #[test]
    fn fixed_address_mismatch() {
        let engine = MockEngine::new(DispatchStrategy::Direct);
        let mut builder = ImageBuilder::new().with_base(0x1000);
        builder.push_literal(1);

        let config = Config::new();
        match ImageLoader::new(&config, &engine).load(&builder.build()) {
            Err(Error::NonRelocatableAddressMismatch { expected, actual }) => {
                assert_eq!(expected, 0x1000);
                assert_ne!(actual, 0x1000);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn truncated_images() {
        let engine = MockEngine::new(DispatchStrategy::Direct);
        let config = Config::new();
        let loader = ImageLoader::new(&config, &engine);

        let mut builder = ImageBuilder::new();
        builder.push_literal(1);
        builder.push_offset(0);
        let bytes = builder.build();

        // bitmap missing
        let without_bitmap = &bytes[..8 + (HEADER_WORDS + 2) * WORD];
        assert!(matches!(loader.load(without_bitmap), Err(Error::OutOfBounds)));

        // body cut short
        let cut = &bytes[..8 + HEADER_WORDS * WORD + 1];
        assert!(matches!(loader.load(cut), Err(Error::OutOfBounds)));

        // header cut short
        assert!(matches!(loader.load(&bytes[..12]), Err(Error::OutOfBounds)));

        assert!(matches!(loader.load(b"not an image"), Err(Error::NotAnImage)));
    }

    #[test]
    fn image_larger_than_dictionary() {
        let engine = MockEngine::new(DispatchStrategy::Direct);
        let mut builder = ImageBuilder::new();
        for value in 0..64 {
            builder.push_literal(value);
        }

        let config = Config::new().with_sizes(RegionSizes {
            dictionary: 64,
            ..RegionSizes::default()
        });
        let result = ImageLoader::new(&config, &engine).load(&builder.build());
        assert!(matches!(result, Err(Error::Malformed { .. })));
    }

    #[test]
    fn table_mismatch_is_malformed() {
        let table = table_factory(9);
        let mut builder = ImageBuilder::new();
        builder.push_primitive(20);

        let config = Config::new();
        let loader = ImageLoader::with_table(&config, &table, DispatchStrategy::Direct);
        assert!(matches!(
            loader.load(&builder.build()),
            Err(Error::Malformed { .. })
        ));
    }
}
