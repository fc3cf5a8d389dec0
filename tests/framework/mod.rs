#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;

use deimos::prelude::*;

#[derive(Debug)]
pub struct Context {
    pub device: Arc<HeadlessDevice>,
    pub ctx: ComputeContext,
}

/// Creates a headless deimos context ready for automated tests
pub fn make_context() -> Result<Context> {
    make_context_with_settings(|builder| builder)
}

pub fn make_context_with_settings<F: FnOnce(ContextBuilder) -> ContextBuilder>(callback: F) -> Result<Context> {
    make_context_on_device(HeadlessDevice::new(), callback)
}

pub fn make_context_on_device<F: FnOnce(ContextBuilder) -> ContextBuilder>(device: HeadlessDevice, callback: F) -> Result<Context> {
    let _ = pretty_env_logger::try_init();
    let settings = callback(ContextBuilder::new().name("deimos test framework")).build();
    let device = Arc::new(device);
    let ctx = deimos::initialize(settings, device.clone())?;
    Ok(Context {
        device,
        ctx,
    })
}

pub fn buffer(device: &HeadlessDevice, name: &str, size: u64) -> Result<ResourceHandle> {
    Ok(device.allocate(&ResourceDesc::buffer(name, size))?)
}

pub fn buffer_with_data(device: &HeadlessDevice, name: &str, data: Vec<u8>) -> Result<ResourceHandle> {
    Ok(device.allocate(&ResourceDesc::buffer(name, data.len() as u64).with_data(data))?)
}

/// Interface with one buffer slot per entry, numbered from zero.
pub fn buffer_interface(access: &[Access]) -> ShaderInterface {
    access
        .iter()
        .enumerate()
        .fold(ShaderInterface::builder(), |builder, (slot, access)| {
            builder.slot(slot as u32, ResourceKind::Buffer, *access)
        })
        .build()
}

/// Bind `resources` to consecutive buffer slots with the given accesses.
pub fn buffer_bindings(resources: &[(ResourceHandle, Access)]) -> BindingSet {
    resources
        .iter()
        .enumerate()
        .fold(BindingSet::new(), |set, (slot, (resource, access))| set.buffer(slot as u32, *resource, *access))
}

/// Register a shader with a buffer interface matching `resources`, and build its pipeline.
pub fn make_pipeline(ctx: &mut ComputeContext, name: &str, resources: &[(ResourceHandle, Access)]) -> Result<PipelineState> {
    let access = resources.iter().map(|(_, access)| *access).collect::<Vec<_>>();
    let interface = buffer_interface(&access);
    let shader = ctx.register_shader(ShaderCreateInfo::from_bytecode(name, name.as_bytes().to_vec(), interface.clone()));
    let layout = ResourceBindingTable::validate(&interface, buffer_bindings(resources).bindings())?;
    Ok(ctx.get_or_create(shader, &layout)?)
}

/// Submit a single group dispatch of `pipeline` over `resources`.
pub fn dispatch(ctx: &mut ComputeContext, pipeline: &PipelineState, resources: &[(ResourceHandle, Access)]) -> Result<GpuFence> {
    let request = DispatchRequest::new(pipeline, buffer_bindings(resources), WorkGroupCount::new(1, 1, 1))?;
    Ok(ctx.submit(request)?)
}
