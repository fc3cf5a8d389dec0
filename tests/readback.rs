use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use futures::executor::block_on;

use deimos::prelude::*;

mod framework;

/// Records how often a callback ran and what it received.
#[derive(Debug, Default, Clone)]
struct Sink {
    calls: Arc<AtomicUsize>,
    data: Arc<Mutex<Vec<u8>>>,
}

impl Sink {
    fn callback(&self) -> impl FnOnce(Vec<u8>) + Send + 'static {
        let calls = self.calls.clone();
        let data = self.data.clone();
        move |bytes| {
            calls.fetch_add(1, Ordering::SeqCst);
            *data.lock().unwrap() = bytes;
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn data(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }
}

fn tick(ctx: &mut ComputeContext) -> Result<FrameReport> {
    ctx.on_frame_begin()?;
    Ok(ctx.on_frame_end()?)
}

#[test]
fn callback_fires_once_after_retirement() -> Result<()> {
    let framework::Context { device, mut ctx } = framework::make_context()?;
    let a = framework::buffer_with_data(&device, "a", vec![1, 2, 3, 4])?;
    device.register_kernel("increment", |kernel| {
        let incremented = kernel.read(0).unwrap_or_default().iter().map(|v| v + 1).collect::<Vec<_>>();
        kernel.write(0, &incremented);
    });
    let resources = [(a, Access::ReadWrite)];
    let pipeline = framework::make_pipeline(&mut ctx, "increment", &resources)?;
    let sink = Sink::default();

    ctx.on_frame_begin()?;
    let fence = framework::dispatch(&mut ctx, &pipeline, &resources)?;
    let handle = ctx.request_readback(fence, a, 4, sink.callback())?;
    ctx.on_frame_end()?;
    assert_eq!(sink.calls(), 0);
    assert!(ctx.readbacks().is_pending(handle));

    // Submitted but not executed, polling must not deliver anything
    for _ in 0..3 {
        tick(&mut ctx)?;
    }
    assert_eq!(sink.calls(), 0);

    device.advance_all();
    let report = tick(&mut ctx)?;
    assert_eq!(report.readbacks_fulfilled, 1);
    assert_eq!(sink.calls(), 1);
    assert_eq!(sink.data(), vec![2, 3, 4, 5]);
    assert!(!ctx.readbacks().is_pending(handle));

    for _ in 0..3 {
        tick(&mut ctx)?;
    }
    assert_eq!(sink.calls(), 1);
    Ok(())
}

#[test]
fn never_reached_fence_can_be_cancelled() -> Result<()> {
    let framework::Context { device, mut ctx } = framework::make_context()?;
    let a = framework::buffer(&device, "a", 16)?;
    let sink = Sink::default();
    let handle = ctx.request_readback(GpuFence::new(5000), a, 16, sink.callback())?;

    for _ in 0..1000 {
        device.advance_all();
        let report = tick(&mut ctx)?;
        assert_eq!(report.readbacks_fulfilled, 0);
    }
    assert_eq!(sink.calls(), 0);
    assert_eq!(ctx.cancel_readback(handle), Cancellation::Cancelled);
    assert_eq!(ctx.readbacks().pending_count(), 0);
    assert_eq!(ctx.cancel_readback(handle), Cancellation::Unknown);
    assert_eq!(sink.calls(), 0);
    Ok(())
}

#[test]
fn cancel_after_retirement_is_a_no_op() -> Result<()> {
    let framework::Context { device, mut ctx } = framework::make_context()?;
    let a = framework::buffer_with_data(&device, "a", vec![9; 8])?;
    let resources = [(a, Access::Read)];
    let pipeline = framework::make_pipeline(&mut ctx, "noop", &resources)?;
    let sink = Sink::default();

    ctx.on_frame_begin()?;
    let fence = framework::dispatch(&mut ctx, &pipeline, &resources)?;
    let handle = ctx.request_readback(fence, a, 8, sink.callback())?;
    ctx.on_frame_end()?;
    device.advance_all();

    assert_eq!(ctx.cancel_readback(handle), Cancellation::AlreadyRetired);
    tick(&mut ctx)?;
    assert_eq!(sink.calls(), 1);
    assert_eq!(sink.data(), vec![9; 8]);
    Ok(())
}

#[test]
fn readbacks_on_same_fence_are_coalesced() -> Result<()> {
    let framework::Context { device, mut ctx } = framework::make_context()?;
    let a = framework::buffer_with_data(&device, "a", (0..16).collect())?;
    let b = framework::buffer_with_data(&device, "b", vec![7; 4])?;
    let resources = [(a, Access::Read), (b, Access::Read)];
    let pipeline = framework::make_pipeline(&mut ctx, "noop", &resources)?;
    let small = Sink::default();
    let large = Sink::default();
    let other = Sink::default();

    ctx.on_frame_begin()?;
    let fence = framework::dispatch(&mut ctx, &pipeline, &resources)?;
    ctx.request_readback(fence, a, 4, small.callback())?;
    ctx.request_readback(fence, a, 12, large.callback())?;
    ctx.request_readback(fence, b, 4, other.callback())?;
    ctx.on_frame_end()?;
    device.advance_all();

    let report = tick(&mut ctx)?;
    assert_eq!(report.readbacks_fulfilled, 3);
    assert_eq!(device.host_copies(), 2);
    assert_eq!(small.data(), vec![0, 1, 2, 3]);
    assert_eq!(large.data(), (0..12).collect::<Vec<u8>>());
    assert_eq!(other.data(), vec![7; 4]);
    assert_eq!((small.calls(), large.calls(), other.calls()), (1, 1, 1));
    Ok(())
}

#[test]
fn zero_size_is_rejected() -> Result<()> {
    let framework::Context { device, mut ctx } = framework::make_context()?;
    let a = framework::buffer(&device, "a", 16)?;
    let sink = Sink::default();
    assert!(matches!(ctx.request_readback(GpuFence::ZERO, a, 0, sink.callback()), Err(ReadbackError::ZeroSize)));
    Ok(())
}

#[test]
fn readback_future() -> Result<()> {
    let framework::Context { device, mut ctx } = framework::make_context()?;
    let a = framework::buffer_with_data(&device, "a", vec![5, 6, 7, 8])?;
    let resources = [(a, Access::Read)];
    let pipeline = framework::make_pipeline(&mut ctx, "noop", &resources)?;

    ctx.on_frame_begin()?;
    let fence = framework::dispatch(&mut ctx, &pipeline, &resources)?;
    let mut future = ctx.request_readback_future(fence, a, 2)?;
    let cancelled = ctx.request_readback_future(fence, a, 4)?;
    ctx.on_frame_end()?;

    assert!(future.try_take().is_none());
    assert_eq!(ctx.cancel_readback(cancelled.handle()), Cancellation::Cancelled);
    assert_eq!(block_on(cancelled), Err(ReadbackError::Cancelled));

    device.advance_all();
    tick(&mut ctx)?;
    assert_eq!(block_on(future)?, vec![5, 6]);
    Ok(())
}

#[test]
fn blocking_readback() -> Result<()> {
    let framework::Context { device, mut ctx } = framework::make_context_with_settings(|builder| {
        builder.sync_readback_timeout(std::time::Duration::from_millis(10))
    })?;
    let a = framework::buffer_with_data(&device, "a", vec![1, 1, 1, 1])?;
    device.register_kernel("fill", |kernel| {
        kernel.write(0, &[42; 4]);
    });
    let resources = [(a, Access::Write)];
    let pipeline = framework::make_pipeline(&mut ctx, "fill", &resources)?;

    ctx.on_frame_begin()?;
    let fence = framework::dispatch(&mut ctx, &pipeline, &resources)?;
    // Not handed to the device yet, read_sync flushes first
    assert_eq!(ctx.read_sync(fence, a, 4)?, vec![42; 4]);
    ctx.on_frame_end()?;

    assert_eq!(ctx.read_sync(GpuFence::new(100), a, 4), Err(ReadbackError::Timeout(GpuFence::new(100))));
    Ok(())
}

#[test]
fn rejected_batch_never_fulfills_readbacks() -> Result<()> {
    let framework::Context { device, mut ctx } = framework::make_context()?;
    let a = framework::buffer(&device, "a", 16)?;
    let resources = [(a, Access::ReadWrite)];
    let pipeline = framework::make_pipeline(&mut ctx, "step", &resources)?;
    let sink = Sink::default();

    ctx.on_frame_begin()?;
    let first = framework::dispatch(&mut ctx, &pipeline, &resources)?;
    let second = framework::dispatch(&mut ctx, &pipeline, &resources)?;
    ctx.request_readback(second, a, 16, sink.callback())?;
    let future = ctx.request_readback_future(first, a, 16)?;
    device.fail_next_submit(DeviceError::OutOfMemory);

    let result = ctx.on_frame_end();
    assert_eq!(
        result,
        Err(FrameError::Dispatch(DispatchError::DeviceFailure {
            cause: DeviceError::OutOfMemory,
            rejected: 2,
        }))
    );
    assert_eq!(block_on(future), Err(ReadbackError::Rejected(first)));
    assert!(matches!(
        ctx.request_readback(first, a, 16, Sink::default().callback()),
        Err(ReadbackError::Rejected(_))
    ));

    // Later frames work again and never deliver the rejected readback.
    ctx.on_frame_begin()?;
    let third = framework::dispatch(&mut ctx, &pipeline, &resources)?;
    assert!(third > second);
    ctx.on_frame_end()?;
    device.advance_all();
    tick(&mut ctx)?;
    assert_eq!(sink.calls(), 0);
    assert_eq!(ctx.readbacks().pending_count(), 0);
    Ok(())
}

#[test]
fn device_lost_is_reported_from_frame_end() -> Result<()> {
    let framework::Context { device, mut ctx } = framework::make_context()?;
    let a = framework::buffer(&device, "a", 16)?;
    let sink = Sink::default();
    ctx.request_readback(GpuFence::new(1), a, 16, sink.callback())?;

    device.lose_device();
    ctx.on_frame_begin()?;
    let result = ctx.on_frame_end();
    assert!(matches!(
        result,
        Err(FrameError::Dispatch(DispatchError::DeviceFailure { cause: DeviceError::Lost, .. }))
    ));
    assert_eq!(sink.calls(), 0);
    Ok(())
}

#[test]
fn failed_host_copy_drops_callback_and_fails_future() -> Result<()> {
    let framework::Context { device, mut ctx } = framework::make_context()?;
    let a = framework::buffer(&device, "a", 16)?;
    let sink = Sink::default();
    ctx.request_readback(GpuFence::ZERO, a, 16, sink.callback())?;
    let future = ctx.request_readback_future(GpuFence::ZERO, a, 8)?;
    device.free(a);

    let report = tick(&mut ctx)?;
    assert_eq!(report.readbacks_fulfilled, 0);
    assert_eq!(report.readbacks_failed, 2);
    assert_eq!(device.host_copies(), 0);
    assert_eq!(sink.calls(), 0);
    assert_eq!(block_on(future), Err(ReadbackError::Device(DeviceError::UnknownResource(a.id()))));
    assert_eq!(ctx.readbacks().pending_count(), 0);
    Ok(())
}

#[test]
fn consecutive_rejections_are_merged() -> Result<()> {
    let framework::Context { device, mut ctx } = framework::make_context()?;
    let a = framework::buffer(&device, "a", 16)?;
    let resources = [(a, Access::ReadWrite)];
    let pipeline = framework::make_pipeline(&mut ctx, "step", &resources)?;

    let frame = |ctx: &mut ComputeContext, dispatches: usize, fail: bool| -> Result<Vec<GpuFence>> {
        ctx.on_frame_begin()?;
        let fences = (0..dispatches)
            .map(|_| framework::dispatch(ctx, &pipeline, &resources))
            .collect::<Result<Vec<_>>>()?;
        if fail {
            device.fail_next_submit(DeviceError::OutOfMemory);
        }
        assert_eq!(ctx.on_frame_end().is_err(), fail);
        Ok(fences)
    };

    frame(&mut ctx, 2, true)?;
    frame(&mut ctx, 1, true)?;
    assert_eq!(ctx.readbacks().rejected_ranges(), &[GpuFence::new(1)..=GpuFence::new(3)]);

    let kept = frame(&mut ctx, 1, false)?;
    frame(&mut ctx, 1, true)?;
    assert_eq!(
        ctx.readbacks().rejected_ranges(),
        &[GpuFence::new(1)..=GpuFence::new(3), GpuFence::new(5)..=GpuFence::new(5)]
    );

    assert!(ctx.request_readback_future(kept[0], a, 4).is_ok());
    for rejected in [1, 2, 3, 5] {
        assert_eq!(
            ctx.request_readback_future(GpuFence::new(rejected), a, 4).err(),
            Some(ReadbackError::Rejected(GpuFence::new(rejected)))
        );
    }
    Ok(())
}
