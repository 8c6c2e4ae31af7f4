use bytes::{Bytes, BytesMut};
use criterion::{Criterion, criterion_group, criterion_main};
use http::{HeaderMap, Method};
use micro_http_client::{
    codec::{RequestEncoder, ResponseDecoder},
    connection::HttpConnection,
    pool::Connector,
    protocol::{Message, PayloadSize, make_request},
    timeout::Timeout,
};
use std::hint::black_box;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::runtime::Runtime;
use tokio_util::codec::{Decoder, Encoder};

const RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 12\r\n\r\nHello World!";

fn bench_request_encoder(c: &mut Criterion) {
    let request = make_request(Method::GET, "http://localhost/index.html", HeaderMap::new(), None).unwrap();

    c.bench_function("encode_simple_request", |b| {
        b.iter(|| {
            let mut encoder = RequestEncoder::new();
            let mut bytes = BytesMut::new();
            let (head, _body) = request.clone().into_parts();
            let message = Message::<_, Bytes>::Header((head, PayloadSize::Empty));
            black_box(encoder.encode(message, &mut bytes).unwrap());
        });
    });
}

fn bench_response_decoder(c: &mut Criterion) {
    c.bench_function("decode_simple_response", |b| {
        b.iter(|| {
            let mut decoder = ResponseDecoder::new(Method::GET);
            let mut bytes = BytesMut::from(RESPONSE);
            black_box(decoder.decode(&mut bytes).unwrap());
            black_box(decoder.decode(&mut bytes).unwrap());
        });
    });
}

/// Answers every request of every connection with [`RESPONSE`].
async fn keep_alive_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                while let Ok(n) = socket.read(&mut buf).await {
                    if n == 0 || socket.write_all(RESPONSE).await.is_err() {
                        return;
                    }
                }
            });
        }
    });
    port
}

fn bench_pooled_exchange(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let port = runtime.block_on(keep_alive_server());
    let connector = Connector::new(16, 4);
    let timeout = Timeout::uniform(Duration::from_secs(5));

    c.bench_function("pooled_get_exchange", |b| {
        b.to_async(&runtime).iter(|| {
            let connector = connector.clone();
            async move {
                let connection = connector.acquire("127.0.0.1", port, None, timeout, None).await.unwrap();
                let request = make_request(Method::GET, "/", HeaderMap::new(), None).unwrap();
                let mut response =
                    HttpConnection::new(connector, connection).write_request_read_response(request).await.unwrap();
                black_box(response.read().await.unwrap());
            }
        });
    });
}

criterion_group!(benches, bench_request_encoder, bench_response_decoder, bench_pooled_exchange);
criterion_main!(benches);
