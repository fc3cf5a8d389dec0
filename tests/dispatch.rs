use anyhow::Result;

use deimos::prelude::*;

mod framework;

fn barrier_commands(device: &HeadlessDevice) -> Vec<ResourceBarrier> {
    device
        .submitted_batches()
        .iter()
        .flat_map(|batch| batch.commands().to_vec())
        .filter_map(|cmd| match cmd {
            Command::Barrier(barrier) => Some(barrier),
            _ => None,
        })
        .collect()
}

#[test]
fn work_group_count_rounds_up() {
    assert_eq!(WorkGroupCount::for_threads([1920, 1080, 1], [16, 16, 1]), WorkGroupCount::new(120, 68, 1));
    assert_eq!(WorkGroupCount::for_threads([64, 1, 1], [64, 1, 1]), WorkGroupCount::new(1, 1, 1));
    assert_eq!(WorkGroupCount::for_threads([65, 1, 1], [64, 0, 1]), WorkGroupCount::new(2, 1, 1));
    assert_eq!(WorkGroupCount::for_threads([0, 1, 1], [8, 1, 1]).x, 0);
}

#[test]
fn work_group_count_near_thread_limit() {
    let groups = WorkGroupCount::for_threads([u32::MAX, u32::MAX, u32::MAX - 1], [16, 1, 2]);
    assert_eq!(groups, WorkGroupCount::new(u32::MAX / 16 + 1, u32::MAX, u32::MAX / 2));
    assert_eq!(WorkGroupCount::for_threads([u32::MAX, 1, 1], [u32::MAX, 1, 1]).x, 1);
}

#[test]
fn submit_requires_active_frame() -> Result<()> {
    let framework::Context { device, mut ctx } = framework::make_context()?;
    let buf = framework::buffer(&device, "data", 64)?;
    let resources = [(buf, Access::Write)];
    let pipeline = framework::make_pipeline(&mut ctx, "fill", &resources)?;
    let request = DispatchRequest::new(&pipeline, framework::buffer_bindings(&resources), [1, 1, 1])?;
    assert_eq!(ctx.submit(request), Err(DispatchError::NoActiveFrame));
    Ok(())
}

#[test]
fn invalid_extent_records_nothing() -> Result<()> {
    let framework::Context { device, mut ctx } = framework::make_context()?;
    let buf = framework::buffer(&device, "data", 64)?;
    let resources = [(buf, Access::Write)];
    let pipeline = framework::make_pipeline(&mut ctx, "fill", &resources)?;

    ctx.on_frame_begin()?;
    let zero = DispatchRequest::new(&pipeline, framework::buffer_bindings(&resources), [4, 0, 1])?;
    assert_eq!(
        ctx.submit(zero),
        Err(DispatchError::InvalidExtent {
            axis: 1,
            count: 0,
            max: 65535,
        })
    );
    let huge = DispatchRequest::new(&pipeline, framework::buffer_bindings(&resources), [65536, 1, 1])?;
    assert!(matches!(ctx.submit(huge), Err(DispatchError::InvalidExtent { axis: 0, count: 65536, .. })));
    assert_eq!(ctx.scheduler().pending_dispatches(), 0);
    assert_eq!(ctx.scheduler().last_fence(), GpuFence::ZERO);

    let report = ctx.on_frame_end()?;
    assert_eq!(report.dispatches, 0);
    let batches = device.submitted_batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].commands(), &[Command::FrameBoundary(report.epoch)]);
    Ok(())
}

#[test]
fn settings_tighten_device_limits() -> Result<()> {
    let framework::Context { device, mut ctx } = framework::make_context_with_settings(|builder| builder.max_workgroups([8, 8, 1]))?;
    assert_eq!(ctx.scheduler().limits().max_workgroup_count, [8, 8, 1]);
    let buf = framework::buffer(&device, "data", 64)?;
    let resources = [(buf, Access::Write)];
    let pipeline = framework::make_pipeline(&mut ctx, "fill", &resources)?;

    ctx.on_frame_begin()?;
    let request = DispatchRequest::new(&pipeline, framework::buffer_bindings(&resources), [8, 8, 2])?;
    assert_eq!(
        ctx.submit(request),
        Err(DispatchError::InvalidExtent {
            axis: 2,
            count: 2,
            max: 1,
        })
    );
    ctx.on_frame_end()?;
    Ok(())
}

#[test]
fn bindings_are_checked_against_pipeline_layout() -> Result<()> {
    let framework::Context { device, mut ctx } = framework::make_context()?;
    let buf = framework::buffer(&device, "data", 64)?;
    let pipeline = framework::make_pipeline(&mut ctx, "fill", &[(buf, Access::Write)])?;
    let wrong = framework::buffer_bindings(&[(buf, Access::Read)]);
    assert!(matches!(
        DispatchRequest::new(&pipeline, wrong, [1, 1, 1]),
        Err(BindingError::AccessViolation { slot: 0, .. })
    ));
    Ok(())
}

#[test]
fn read_after_write_gets_barrier() -> Result<()> {
    let framework::Context { device, mut ctx } = framework::make_context()?;
    let a = framework::buffer(&device, "a", 64)?;
    let writer = framework::make_pipeline(&mut ctx, "writer", &[(a, Access::Write)])?;
    let reader = framework::make_pipeline(&mut ctx, "reader", &[(a, Access::Read)])?;

    ctx.on_frame_begin()?;
    let first = framework::dispatch(&mut ctx, &writer, &[(a, Access::Write)])?;
    let second = framework::dispatch(&mut ctx, &reader, &[(a, Access::Read)])?;
    let third = framework::dispatch(&mut ctx, &reader, &[(a, Access::Read)])?;
    let report = ctx.on_frame_end()?;

    assert_eq!(report.barriers, 1);
    assert!(first < second && second < third);
    let barriers = barrier_commands(&device);
    assert_eq!(barriers.len(), 1);
    assert_eq!(barriers[0].resource, a);
    assert_eq!(barriers[0].src_access, Access::Write);
    assert_eq!(barriers[0].dst_access, Access::Read);
    assert!(ctx.scheduler().graph().depends_on(third, first));
    Ok(())
}

#[test]
fn read_after_read_needs_no_barrier() -> Result<()> {
    let framework::Context { device, mut ctx } = framework::make_context()?;
    let a = framework::buffer(&device, "a", 64)?;
    let reader = framework::make_pipeline(&mut ctx, "reader", &[(a, Access::Read)])?;

    ctx.on_frame_begin()?;
    for _ in 0..3 {
        framework::dispatch(&mut ctx, &reader, &[(a, Access::Read)])?;
    }
    let report = ctx.on_frame_end()?;
    assert_eq!(report.barriers, 0);
    assert!(barrier_commands(&device).is_empty());
    Ok(())
}

#[test]
fn write_hazards_get_barriers() -> Result<()> {
    let framework::Context { device, mut ctx } = framework::make_context()?;
    let a = framework::buffer(&device, "a", 64)?;
    let writer = framework::make_pipeline(&mut ctx, "writer", &[(a, Access::Write)])?;
    let reader = framework::make_pipeline(&mut ctx, "reader", &[(a, Access::Read)])?;

    ctx.on_frame_begin()?;
    framework::dispatch(&mut ctx, &reader, &[(a, Access::Read)])?;
    // Write after read
    framework::dispatch(&mut ctx, &writer, &[(a, Access::Write)])?;
    // Write after write
    framework::dispatch(&mut ctx, &writer, &[(a, Access::Write)])?;
    let report = ctx.on_frame_end()?;

    assert_eq!(report.barriers, 2);
    let barriers = barrier_commands(&device);
    assert_eq!(barriers[0].src_access, Access::Read);
    assert_eq!(barriers[1].src_access, Access::Write);
    Ok(())
}

#[test]
fn three_dispatch_scenario() -> Result<()> {
    let framework::Context { device, mut ctx } = framework::make_context()?;
    let a = framework::buffer(&device, "a", 64)?;
    let b = framework::buffer(&device, "b", 64)?;
    let c = framework::buffer(&device, "c", 64)?;
    let d1_res = [(a, Access::Write)];
    let d2_res = [(a, Access::Read), (b, Access::Write)];
    let d3_res = [(c, Access::Read)];
    let d1 = framework::make_pipeline(&mut ctx, "d1", &d1_res)?;
    let d2 = framework::make_pipeline(&mut ctx, "d2", &d2_res)?;
    let d3 = framework::make_pipeline(&mut ctx, "d3", &d3_res)?;

    ctx.on_frame_begin()?;
    let f1 = framework::dispatch(&mut ctx, &d1, &d1_res)?;
    let f2 = framework::dispatch(&mut ctx, &d2, &d2_res)?;
    let f3 = framework::dispatch(&mut ctx, &d3, &d3_res)?;
    let report = ctx.on_frame_end()?;

    assert_eq!(report.dispatches, 3);
    assert_eq!(report.barriers, 1);
    let graph = ctx.scheduler().graph();
    assert_eq!(graph.barrier_count(), 1);
    assert_eq!(graph.dependencies_of(f2), vec![f1]);
    assert!(graph.dependencies_of(f3).is_empty());
    assert!(!graph.depends_on(f3, f1));
    assert!(!graph.depends_on(f3, f2));
    assert_eq!(graph.independent_dispatches(), vec![f1, f3]);
    assert_eq!(graph.sinks(), vec![f2, f3]);

    let dot = graph.dot()?;
    assert!(dot.contains("d2"));
    assert!(dot.contains("shape=box"));
    Ok(())
}

#[test]
fn dispatches_execute_in_submission_order() -> Result<()> {
    let framework::Context { device, mut ctx } = framework::make_context()?;
    let a = framework::buffer(&device, "a", 64)?;
    let b = framework::buffer(&device, "b", 64)?;
    let on_a = framework::make_pipeline(&mut ctx, "on_a", &[(a, Access::ReadWrite)])?;
    let on_b = framework::make_pipeline(&mut ctx, "on_b", &[(b, Access::ReadWrite)])?;

    ctx.on_frame_begin()?;
    let mut expected = Vec::new();
    for (i, priority) in [DispatchPriority::Low, DispatchPriority::High, DispatchPriority::Normal, DispatchPriority::High]
        .into_iter()
        .enumerate()
    {
        let (pipeline, resource) = if i % 2 == 0 { (&on_a, a) } else { (&on_b, b) };
        let request = DispatchRequest::new(pipeline, framework::buffer_bindings(&[(resource, Access::ReadWrite)]), [1, 1, 1])?
            .priority(priority);
        ctx.submit(request)?;
        expected.push((pipeline.raw(), priority));
    }
    ctx.on_frame_end()?;
    device.advance_all();

    let executed = device
        .executed_commands()
        .into_iter()
        .filter_map(|cmd| match cmd {
            Command::Dispatch(dispatch) => Some((dispatch.pipeline, dispatch.priority)),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(executed, expected);
    Ok(())
}

#[test]
fn frame_boundary_resets_hazards() -> Result<()> {
    let framework::Context { device, mut ctx } = framework::make_context()?;
    let a = framework::buffer(&device, "a", 64)?;
    let writer = framework::make_pipeline(&mut ctx, "writer", &[(a, Access::Write)])?;
    let reader = framework::make_pipeline(&mut ctx, "reader", &[(a, Access::Read)])?;

    ctx.on_frame_begin()?;
    framework::dispatch(&mut ctx, &writer, &[(a, Access::Write)])?;
    assert_eq!(ctx.on_frame_end()?.barriers, 0);

    ctx.on_frame_begin()?;
    framework::dispatch(&mut ctx, &reader, &[(a, Access::Read)])?;
    assert_eq!(ctx.on_frame_end()?.barriers, 0);

    let batches = device.submitted_batches();
    assert_eq!(batches.len(), 2);
    assert!(matches!(batches[0].commands().last(), Some(Command::FrameBoundary(0))));
    assert!(matches!(batches[1].commands().last(), Some(Command::FrameBoundary(1))));
    Ok(())
}

#[test]
fn labels_wrap_dispatches() -> Result<()> {
    let framework::Context { device, mut ctx } = framework::make_context()?;
    let a = framework::buffer(&device, "a", 64)?;
    let resources = [(a, Access::Write)];
    let pipeline = framework::make_pipeline(&mut ctx, "fill", &resources)?;

    ctx.on_frame_begin()?;
    let request = DispatchRequest::new(&pipeline, framework::buffer_bindings(&resources), [1, 1, 1])?.label("Colour Replace Compute Pass");
    let fence = ctx.submit(request)?;
    ctx.on_frame_end()?;

    let batch = &device.submitted_batches()[0];
    let commands = batch.commands();
    if cfg!(feature = "debug-markers") {
        assert_eq!(commands[0], Command::BeginLabel(String::from("Colour Replace Compute Pass")));
        assert!(matches!(commands[1], Command::Dispatch(_)));
        assert_eq!(commands[2], Command::EndLabel);
        assert_eq!(commands[3], Command::Signal(fence));
    } else {
        assert!(matches!(commands[0], Command::Dispatch(_)));
    }
    Ok(())
}

#[test]
fn labels_can_be_disabled() -> Result<()> {
    let framework::Context { device, mut ctx } = framework::make_context_with_settings(|builder| builder.debug_markers(false))?;
    let a = framework::buffer(&device, "a", 64)?;
    let resources = [(a, Access::Write)];
    let pipeline = framework::make_pipeline(&mut ctx, "fill", &resources)?;

    ctx.on_frame_begin()?;
    let request = DispatchRequest::new(&pipeline, framework::buffer_bindings(&resources), [1, 1, 1])?.label("unused");
    ctx.submit(request)?;
    ctx.on_frame_end()?;
    let batch = &device.submitted_batches()[0];
    assert!(!batch.commands().iter().any(|cmd| matches!(cmd, Command::BeginLabel(_) | Command::EndLabel)));
    Ok(())
}

#[test]
fn indirect_dispatch() -> Result<()> {
    let framework::Context { device, mut ctx } = framework::make_context()?;
    let out = framework::buffer(&device, "out", 16)?;
    let mut args_data = vec![0u8; 4];
    for count in [3u32, 2, 1] {
        args_data.extend_from_slice(&count.to_le_bytes());
    }
    let args = framework::buffer_with_data(&device, "args", args_data)?;
    let texture = device.allocate(&ResourceDesc::texture("not a buffer", 64))?;

    device.register_kernel("groups", |kernel| {
        let groups = kernel.groups();
        kernel.write(0, &[groups[0] as u8, groups[1] as u8, groups[2] as u8]);
    });
    let resources = [(out, Access::Write)];
    let pipeline = framework::make_pipeline(&mut ctx, "groups", &resources)?;
    let bindings = || framework::buffer_bindings(&resources);

    ctx.on_frame_begin()?;
    let not_buffer = DispatchRequest::new(&pipeline, bindings(), DispatchExtent::Indirect { args: texture, offset: 0 })?;
    assert!(matches!(ctx.submit(not_buffer), Err(DispatchError::InvalidIndirectArgs(_))));
    let misaligned = DispatchRequest::new(&pipeline, bindings(), DispatchExtent::Indirect { args, offset: 2 })?;
    assert!(matches!(ctx.submit(misaligned), Err(DispatchError::InvalidIndirectArgs(_))));
    let out_of_bounds = DispatchRequest::new(&pipeline, bindings(), DispatchExtent::Indirect { args, offset: 8 })?;
    assert!(matches!(ctx.submit(out_of_bounds), Err(DispatchError::InvalidIndirectArgs(_))));

    let fence = ctx.submit(DispatchRequest::new(&pipeline, bindings(), DispatchExtent::Indirect { args, offset: 4 })?)?;
    ctx.on_frame_end()?;
    assert_eq!(device.advance(1), fence);
    assert_eq!(device.resource_data(out).map(|data| data[..3].to_vec()), Some(vec![3, 2, 1]));
    Ok(())
}

#[test]
fn indirect_arguments_are_a_read_dependency() -> Result<()> {
    let framework::Context { device, mut ctx } = framework::make_context()?;
    let args = framework::buffer(&device, "args", 12)?;
    let out = framework::buffer(&device, "out", 16)?;
    let producer = framework::make_pipeline(&mut ctx, "write_args", &[(args, Access::Write)])?;
    let consumer = framework::make_pipeline(&mut ctx, "consume", &[(out, Access::Write)])?;

    ctx.on_frame_begin()?;
    let first = framework::dispatch(&mut ctx, &producer, &[(args, Access::Write)])?;
    let request = DispatchRequest::new(&consumer, framework::buffer_bindings(&[(out, Access::Write)]), DispatchExtent::Indirect { args, offset: 0 })?;
    let second = ctx.submit(request)?;
    assert_eq!(ctx.on_frame_end()?.barriers, 1);
    assert_eq!(ctx.scheduler().graph().dependencies_of(second), vec![first]);
    Ok(())
}

#[test]
fn kernels_see_previous_results() -> Result<()> {
    let framework::Context { device, mut ctx } = framework::make_context()?;
    let a = framework::buffer_with_data(&device, "a", vec![1, 2, 3, 4])?;
    device.register_kernel("double", |kernel| {
        let doubled = kernel.read(0).unwrap_or_default().iter().map(|v| v * 2).collect::<Vec<_>>();
        kernel.write(0, &doubled);
    });
    let resources = [(a, Access::ReadWrite)];
    let pipeline = framework::make_pipeline(&mut ctx, "double", &resources)?;

    ctx.on_frame_begin()?;
    framework::dispatch(&mut ctx, &pipeline, &resources)?;
    let last = framework::dispatch(&mut ctx, &pipeline, &resources)?;
    let report = ctx.on_frame_end()?;
    assert_eq!(report.barriers, 1);

    assert_eq!(device.advance_all(), last);
    assert_eq!(device.resource_data(a), Some(vec![4, 8, 12, 16]));
    Ok(())
}
