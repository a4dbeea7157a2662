mod common;

use std::io::Cursor;
use std::net::TcpListener as StdListener;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use common::{wait_for, Recorder};
use dmdgraph::capability::FrameKinds;
use dmdgraph::capture::pipe::PipeFormat;
use dmdgraph::capture::{NetworkSource, PipeSource};
use dmdgraph::frame::{BitDepth, Color, Dimensions, DmdFrame};
use dmdgraph::pipeline::{GraphState, RenderGraph};

fn message(body: &[u8]) -> Vec<u8> {
    let mut out = (body.len() as u32).to_le_bytes().to_vec();
    out.extend_from_slice(body);
    out
}

fn named(name: &str, fields: &[u8]) -> Vec<u8> {
    let mut body = name.as_bytes().to_vec();
    body.push(0);
    body.extend_from_slice(fields);
    message(&body)
}

#[test]
fn pipe_frames_and_clear_sentinel() {
    let dim = Dimensions::new(4, 2);
    let mut stream = message(&[1; 8]);
    stream.extend(message(&[0xde, 0xad, 0xbe, 0xef]));
    stream.extend(message(&[2; 8]));
    let format = PipeFormat {
        dimensions: dim,
        depth: BitDepth::Gray2,
        planes: false,
    };
    let source = PipeSource::new("cursor", Cursor::new(stream), format).unwrap();

    let panel = Recorder::new("panel", FrameKinds::ALL_GRAY);
    let mut graph = RenderGraph::builder("pipe")
        .source(source)
        .destination(panel.clone())
        .build()
        .unwrap();
    graph.start().unwrap();

    // end of stream stops the graph
    wait_for(|| graph.state() == GraphState::Disposed);
    graph.dispose().unwrap();

    let frames = panel.frames();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].raster().data(), &[1; 8][..]);
    assert_eq!(frames[1].raster().data(), &[2; 8][..]);
    assert_eq!(*panel.clears.lock(), 1);
}

#[test]
fn pipe_reads_bit_planes() {
    // pixels 0 1 2 3 0 1 2 3
    let stream = message(&[0xaa, 0xcc]);
    let format = PipeFormat {
        dimensions: Dimensions::new(4, 2),
        depth: BitDepth::Gray2,
        planes: true,
    };
    let source = PipeSource::new("planes", Cursor::new(stream), format).unwrap();
    let panel = Recorder::new("panel", FrameKinds::ALL_GRAY);
    let mut graph = RenderGraph::builder("planes")
        .source(source)
        .destination(panel.clone())
        .build()
        .unwrap();
    graph.start().unwrap();
    wait_for(|| graph.state() == GraphState::Disposed);

    let frames = panel.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].raster().data(), &[0, 1, 2, 3, 0, 1, 2, 3][..]);
}

fn free_port() -> u16 {
    StdListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

async fn wait_async(mut done: impl FnMut() -> bool) {
    let poll = async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), poll).await.expect("timed out");
}

#[tokio::test]
async fn network_client_drives_the_graph() {
    let address = format!("127.0.0.1:{}", free_port());
    let panel = Recorder::new("panel", FrameKinds::ALL_GRAY | FrameKinds::ALL_COLORED);
    let mut graph = RenderGraph::builder("network")
        .source(NetworkSource::new(address.as_str()))
        .destination(panel.clone())
        .build()
        .unwrap();
    graph.start().unwrap();

    let mut client = TcpStream::connect(&address).await.unwrap();
    let dimensions: Vec<u8> = [4i32, 2].iter().flat_map(|v| v.to_le_bytes()).collect();
    client.write_all(&named("dimensions", &dimensions)).await.unwrap();
    client.write_all(&named("color", &0x0000ffi32.to_le_bytes())).await.unwrap();

    let mut gray2 = 7u32.to_le_bytes().to_vec();
    gray2.extend_from_slice(&[0xaa, 0xcc]);
    client.write_all(&named("gray2Planes", &gray2)).await.unwrap();

    let mut colored = 8u32.to_le_bytes().to_vec();
    for value in [2i32, 0x000000, 0x00ff00] {
        colored.extend_from_slice(&value.to_le_bytes());
    }
    colored.extend_from_slice(&[0xaa, 0xcc]);
    client.write_all(&named("coloredGray2", &colored)).await.unwrap();
    client.write_all(&message(&[0, 0, 0, 0])).await.unwrap();
    client.flush().await.unwrap();

    wait_async(|| *panel.clears.lock() == 1).await;
    graph.dispose().unwrap();

    assert_eq!(*panel.colors.lock(), vec![Color::BLUE]);
    let frames = panel.frames();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].raster().data(), &[0, 1, 2, 3, 0, 1, 2, 3][..]);
    let DmdFrame::Colored(colored) = &frames[1] else {
        panic!("expected a colored frame");
    };
    assert_eq!(colored.dimensions(), Dimensions::new(4, 2));
    assert_eq!(colored.palette().len(), 4);
    assert_eq!(colored.palette()[3], Color::rgb(0, 0xff, 0));
}
