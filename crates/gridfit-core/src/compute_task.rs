//! Compute task: one compiled program plus the state needed to dispatch it.
//!
//! A [`ComputeTask`] is the thin layer between a graph node and a native GPU
//! API. It owns exactly one compiled program, recomputes its dispatch shape
//! whenever tensor shapes change, and encodes program binding, argument binding
//! and the dispatch itself onto a command encoder. The native API is reached only
//! through the [`ComputeDevice`] and [`CommandEncoder`] traits.

use std::collections::HashSet;

use crate::dim::Dim3;
use crate::error::{LaunchError, Result, TensorSide};
use crate::launch::{GridLaunchConfig, LaunchConfig};
use crate::math::ceil_div;

/// Identifier of a value (tensor) in the compute graph.
pub type ValueId = u32;

/// Arithmetic precision a program is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalculationsPrecision {
    /// Storage and math in f32.
    #[default]
    F32,
    /// Storage in f16, math in f32.
    F32F16,
    /// Storage and math in f16.
    F16,
}

/// Tensor shape in batch/height/width/channels layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bhwc {
    /// Batch.
    pub b: u32,
    /// Height.
    pub h: u32,
    /// Width.
    pub w: u32,
    /// Channels.
    pub c: u32,
}

impl Bhwc {
    /// Creates a new shape.
    #[must_use]
    pub const fn new(b: u32, h: u32, w: u32, c: u32) -> Self {
        Self { b, h, w, c }
    }

    /// Number of 4-channel slices.
    #[must_use]
    pub fn slices(&self) -> u32 {
        ceil_div(self.c, 4)
    }
}

/// Work-group size and count for one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchParams {
    /// Threads per work group.
    pub groups_size: Dim3,
    /// Work groups in the dispatch.
    pub groups_count: Dim3,
}

impl DispatchParams {
    /// Groups of `groups_size` covering a `grid` of threads, rounding up per axis.
    ///
    /// Axes with a zero group size get a zero group count.
    #[must_use]
    pub fn covering(grid: Dim3, groups_size: Dim3) -> Self {
        let count = |extent: u32, size: u32| if size == 0 { 0 } else { ceil_div(extent, size) };
        Self {
            groups_size,
            groups_count: Dim3::new(
                count(grid.x, groups_size.x),
                count(grid.y, groups_size.y),
                count(grid.z, groups_size.z),
            ),
        }
    }
}

impl From<LaunchConfig> for DispatchParams {
    fn from(config: LaunchConfig) -> Self {
        Self {
            groups_size: config.block_dim().into(),
            groups_count: config.grid_dim().into(),
        }
    }
}

impl From<GridLaunchConfig> for DispatchParams {
    fn from(config: GridLaunchConfig) -> Self {
        Self {
            groups_size: config.threads_per_block,
            groups_count: config.block_count,
        }
    }
}

/// Computes dispatch parameters from source and destination shapes.
pub type DispatchParamsFn = Box<dyn Fn(&[Bhwc], &[Bhwc]) -> DispatchParams + Send + Sync>;

/// Computes shape-dependent scalar arguments from source and destination shapes.
pub type UpdateArgsFn = Box<dyn Fn(&[Bhwc], &[Bhwc]) -> Vec<i32> + Send + Sync>;

/// Everything needed to build a [`ComputeTask`] for one graph node.
pub struct NodeDescriptor {
    /// Human-readable description, used in logs.
    pub description: String,
    /// Program source.
    pub source: String,
    /// Entry point name inside `source`.
    pub entry_point: String,
    /// Values read by the node, in binding order.
    pub input_ids: Vec<ValueId>,
    /// Values written by the node, in binding order.
    pub output_ids: Vec<ValueId>,
    /// Dispatch shape for given tensor shapes.
    pub resize_function: DispatchParamsFn,
    /// Scalar arguments for given tensor shapes, if the program takes any.
    pub update_function: Option<UpdateArgsFn>,
}

impl std::fmt::Debug for NodeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeDescriptor")
            .field("description", &self.description)
            .field("entry_point", &self.entry_point)
            .field("input_ids", &self.input_ids)
            .field("output_ids", &self.output_ids)
            .field("has_update_function", &self.update_function.is_some())
            .finish_non_exhaustive()
    }
}

/// A device able to compile compute programs.
pub trait ComputeDevice {
    /// Compiled program handle (pipeline state).
    type Program;
    /// Handle to a device tensor.
    type Tensor: Clone;

    /// Builds `entry_point` of `source` for `precision`.
    ///
    /// Build failures must be reported as [`LaunchError::Compilation`].
    fn compile_program(
        &self,
        source: &str,
        entry_point: &str,
        precision: CalculationsPrecision,
    ) -> Result<Self::Program>;
}

/// Records compute commands for a device.
pub trait CommandEncoder<D: ComputeDevice + ?Sized> {
    /// Binds the program for subsequent dispatches.
    fn set_program(&mut self, program: &D::Program);

    /// Binds a tensor at a buffer index.
    fn set_tensor(&mut self, index: usize, tensor: &D::Tensor);

    /// Binds scalar arguments at a buffer index.
    fn set_scalars(&mut self, index: usize, values: &[i32]);

    /// Dispatches `groups_count` work groups of `groups_size` threads.
    fn dispatch(&mut self, groups_count: Dim3, groups_size: Dim3);
}

/// A compiled program with its bindings and dispatch shape.
///
/// Not `Clone`: the compiled program is the task's identity and is never
/// duplicated. Encoding takes `&mut self`, so one task cannot be encoded on
/// several command streams at once.
pub struct ComputeTask<D: ComputeDevice> {
    program: D::Program,
    input_ids: Vec<ValueId>,
    output_ids: Vec<ValueId>,
    groups_size: Dim3,
    groups_count: Dim3,
    resize_function: DispatchParamsFn,
    update_function: Option<UpdateArgsFn>,
    scalar_args: Vec<i32>,
    description: String,
    src_tensors: Vec<Option<D::Tensor>>,
    dst_tensors: Vec<Option<D::Tensor>>,
}

impl<D: ComputeDevice> ComputeTask<D> {
    /// Compiles the node's program on `device`.
    ///
    /// The dispatch shape stays empty until [`update_params`](Self::update_params)
    /// is called.
    pub fn compile_with_device(
        device: &D,
        desc: NodeDescriptor,
        precision: CalculationsPrecision,
    ) -> Result<Self> {
        let program = device
            .compile_program(&desc.source, &desc.entry_point, precision)
            .map_err(|e| match e {
                LaunchError::Compilation(msg) => {
                    LaunchError::Compilation(format!("{}: {}", desc.description, msg))
                }
                other => other,
            })?;

        tracing::debug!(
            description = %desc.description,
            entry_point = %desc.entry_point,
            ?precision,
            inputs = desc.input_ids.len(),
            outputs = desc.output_ids.len(),
            "Compiled compute task"
        );

        let src_tensors = vec![None; desc.input_ids.len()];
        let dst_tensors = vec![None; desc.output_ids.len()];

        Ok(Self {
            program,
            input_ids: desc.input_ids,
            output_ids: desc.output_ids,
            groups_size: Dim3::ZERO,
            groups_count: Dim3::ZERO,
            resize_function: desc.resize_function,
            update_function: desc.update_function,
            scalar_args: Vec::new(),
            description: desc.description,
            src_tensors,
            dst_tensors,
        })
    }

    /// Recomputes the dispatch shape and scalar arguments for new tensor shapes.
    pub fn update_params(&mut self, src_shapes: &[Bhwc], dst_shapes: &[Bhwc]) -> Result<()> {
        check_shape_count(TensorSide::Source, self.input_ids.len(), src_shapes.len())?;
        check_shape_count(TensorSide::Destination, self.output_ids.len(), dst_shapes.len())?;

        let params = (self.resize_function)(src_shapes, dst_shapes);
        self.groups_size = params.groups_size;
        self.groups_count = params.groups_count;
        if let Some(update) = &self.update_function {
            self.scalar_args = update(src_shapes, dst_shapes);
        }

        tracing::trace!(
            description = %self.description,
            groups_size = %self.groups_size,
            groups_count = %self.groups_count,
            "Updated dispatch params"
        );
        Ok(())
    }

    /// Returns true if the task reads or writes any of `ids`.
    #[must_use]
    pub fn has_in_out_ids(&self, ids: &HashSet<ValueId>) -> bool {
        self.input_ids
            .iter()
            .chain(self.output_ids.iter())
            .any(|id| ids.contains(id))
    }

    /// Encodes program binding, argument binding and the dispatch.
    ///
    /// Sources bind at indices `0..n_src`, destinations after them, scalars (if
    /// any) last. Fails without encoding anything if a tensor is unbound.
    pub fn encode_with_encoder<E>(&mut self, encoder: &mut E) -> Result<()>
    where
        E: CommandEncoder<D> + ?Sized,
    {
        let src = bound_tensors(&self.src_tensors, TensorSide::Source)?;
        let dst = bound_tensors(&self.dst_tensors, TensorSide::Destination)?;

        encoder.set_program(&self.program);
        for (index, tensor) in src.iter().chain(dst.iter()).enumerate() {
            encoder.set_tensor(index, tensor);
        }
        if !self.scalar_args.is_empty() {
            encoder.set_scalars(src.len() + dst.len(), &self.scalar_args);
        }
        encoder.dispatch(self.groups_count, self.groups_size);
        Ok(())
    }

    /// Values read by the task, in binding order.
    pub fn input_ids(&self) -> &[ValueId] {
        &self.input_ids
    }

    /// Values written by the task, in binding order.
    pub fn output_ids(&self) -> &[ValueId] {
        &self.output_ids
    }

    /// Binds source tensor `index`.
    pub fn set_src_tensor(&mut self, tensor: D::Tensor, index: usize) -> Result<()> {
        bind(&mut self.src_tensors, tensor, index)
    }

    /// Binds destination tensor `index`.
    pub fn set_dst_tensor(&mut self, tensor: D::Tensor, index: usize) -> Result<()> {
        bind(&mut self.dst_tensors, tensor, index)
    }

    /// Replaces the description.
    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    /// Task description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Current dispatch shape.
    pub fn dispatch_params(&self) -> DispatchParams {
        DispatchParams {
            groups_size: self.groups_size,
            groups_count: self.groups_count,
        }
    }
}

fn check_shape_count(side: TensorSide, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(LaunchError::ShapeCountMismatch {
            side,
            expected,
            actual,
        });
    }
    Ok(())
}

fn bind<T>(slots: &mut [Option<T>], tensor: T, index: usize) -> Result<()> {
    let len = slots.len();
    let slot = slots
        .get_mut(index)
        .ok_or(LaunchError::TensorIndexOutOfRange { index, len })?;
    *slot = Some(tensor);
    Ok(())
}

fn bound_tensors<T>(slots: &[Option<T>], side: TensorSide) -> Result<Vec<&T>> {
    slots
        .iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.as_ref()
                .ok_or(LaunchError::MissingTensor { side, index })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Command {
        Program(String),
        Tensor(usize, u64),
        Scalars(usize, Vec<i32>),
        Dispatch(Dim3, Dim3),
    }

    struct FakeDevice;

    impl ComputeDevice for FakeDevice {
        type Program = String;
        type Tensor = u64;

        fn compile_program(
            &self,
            source: &str,
            entry_point: &str,
            precision: CalculationsPrecision,
        ) -> Result<String> {
            if source.is_empty() {
                return Err(LaunchError::compilation("empty source"));
            }
            Ok(format!("{entry_point}@{precision:?}"))
        }
    }

    #[derive(Default)]
    struct RecordingEncoder {
        commands: Vec<Command>,
    }

    impl CommandEncoder<FakeDevice> for RecordingEncoder {
        fn set_program(&mut self, program: &String) {
            self.commands.push(Command::Program(program.clone()));
        }

        fn set_tensor(&mut self, index: usize, tensor: &u64) {
            self.commands.push(Command::Tensor(index, *tensor));
        }

        fn set_scalars(&mut self, index: usize, values: &[i32]) {
            self.commands.push(Command::Scalars(index, values.to_vec()));
        }

        fn dispatch(&mut self, groups_count: Dim3, groups_size: Dim3) {
            self.commands.push(Command::Dispatch(groups_count, groups_size));
        }
    }

    fn add_node(source: &str) -> NodeDescriptor {
        NodeDescriptor {
            description: "add".to_string(),
            source: source.to_string(),
            entry_point: "add_kernel".to_string(),
            input_ids: vec![1, 2],
            output_ids: vec![3],
            resize_function: Box::new(|_src: &[Bhwc], dst: &[Bhwc]| {
                let d = dst[0];
                DispatchParams::covering(
                    Dim3::new(d.w, d.h, d.slices() * d.b),
                    Dim3::new(8, 4, 1),
                )
            }),
            update_function: Some(Box::new(|src: &[Bhwc], _dst: &[Bhwc]| {
                vec![src[0].w as i32, src[0].h as i32]
            })),
        }
    }

    fn compiled() -> ComputeTask<FakeDevice> {
        ComputeTask::compile_with_device(
            &FakeDevice,
            add_node("kernel void add_kernel()"),
            CalculationsPrecision::F16,
        )
        .unwrap()
    }

    #[test]
    fn test_compile_failure_names_node() {
        let err =
            ComputeTask::compile_with_device(&FakeDevice, add_node(""), CalculationsPrecision::F32)
                .err()
                .unwrap();
        assert_eq!(err.to_string(), "Program compilation failed: add: empty source");
    }

    #[test]
    fn test_update_params() {
        let mut task = compiled();
        assert_eq!(task.dispatch_params(), DispatchParams::default());

        let shape = Bhwc::new(1, 30, 17, 6);
        task.update_params(&[shape, shape], &[shape]).unwrap();

        let params = task.dispatch_params();
        assert_eq!(params.groups_size, Dim3::new(8, 4, 1));
        assert_eq!(params.groups_count, Dim3::new(3, 8, 2));
    }

    #[test]
    fn test_update_params_rejects_wrong_shape_count() {
        let mut task = compiled();
        let shape = Bhwc::new(1, 8, 8, 4);
        let err = task.update_params(&[shape], &[shape]).unwrap_err();
        assert!(matches!(
            err,
            LaunchError::ShapeCountMismatch {
                side: TensorSide::Source,
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_encode_binds_in_order() {
        let mut task = compiled();
        let shape = Bhwc::new(1, 8, 16, 4);
        task.update_params(&[shape, shape], &[shape]).unwrap();
        task.set_src_tensor(10, 0).unwrap();
        task.set_src_tensor(11, 1).unwrap();
        task.set_dst_tensor(20, 0).unwrap();

        let mut encoder = RecordingEncoder::default();
        task.encode_with_encoder(&mut encoder).unwrap();

        assert_eq!(
            encoder.commands,
            vec![
                Command::Program("add_kernel@F16".to_string()),
                Command::Tensor(0, 10),
                Command::Tensor(1, 11),
                Command::Tensor(2, 20),
                Command::Scalars(3, vec![16, 8]),
                Command::Dispatch(Dim3::new(2, 2, 1), Dim3::new(8, 4, 1)),
            ]
        );
    }

    #[test]
    fn test_encode_requires_all_bindings() {
        let mut task = compiled();
        task.set_src_tensor(10, 0).unwrap();
        task.set_dst_tensor(20, 0).unwrap();

        let mut encoder = RecordingEncoder::default();
        let err = task.encode_with_encoder(&mut encoder).unwrap_err();
        assert!(matches!(
            err,
            LaunchError::MissingTensor {
                side: TensorSide::Source,
                index: 1
            }
        ));
        assert!(encoder.commands.is_empty());
    }

    #[test]
    fn test_bind_out_of_range() {
        let mut task = compiled();
        assert!(matches!(
            task.set_dst_tensor(5, 1),
            Err(LaunchError::TensorIndexOutOfRange { index: 1, len: 1 })
        ));
    }

    #[test]
    fn test_in_out_ids() {
        let mut task = compiled();
        assert_eq!(task.input_ids(), &[1, 2]);
        assert_eq!(task.output_ids(), &[3]);
        assert!(task.has_in_out_ids(&HashSet::from([3, 9])));
        assert!(!task.has_in_out_ids(&HashSet::from([4, 5])));

        task.set_description("fused add");
        assert_eq!(task.description(), "fused add");
    }

    #[test]
    fn test_dispatch_params_from_launch_config() {
        let config = GridLaunchConfig {
            virtual_thread_count: Dim3::new(100, 100, 1),
            threads_per_block: Dim3::new(32, 8, 1),
            block_count: Dim3::new(4, 13, 1),
        };
        let params = DispatchParams::from(config);
        assert_eq!(params.groups_size, Dim3::new(32, 8, 1));
        assert_eq!(params.groups_count, Dim3::new(4, 13, 1));

        let covering = DispatchParams::covering(Dim3::new(100, 100, 1), Dim3::new(32, 8, 0));
        assert_eq!(covering.groups_count, Dim3::new(4, 13, 0));
    }

    #[test]
    fn test_dispatch_params_from_1d_launch_config() {
        let config = LaunchConfig {
            virtual_thread_count: 10_240,
            threads_per_block: 1024,
            block_count: 10,
        };
        assert_eq!(config.grid_dim(), (10, 1, 1));
        assert_eq!(config.block_dim(), (1024, 1, 1));

        let params = DispatchParams::from(config);
        assert_eq!(params.groups_size, Dim3::new(1024, 1, 1));
        assert_eq!(params.groups_count, Dim3::new(10, 1, 1));
    }
}
