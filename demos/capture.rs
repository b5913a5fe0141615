use shellz::prelude::*;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut cap = OutputCapture::try_new()?;
    let numbered = shellz::cmd!("cat", "-b").stdin("first\nsecond\n".as_bytes()).output()?;
    Command::new("env").env("DEMO_FLAG", "on").no_log().run()?;
    let logged = cap.out_string();

    println!("numbered:\n{}", numbered);
    println!("env saw DEMO_FLAG: {}", logged.contains("DEMO_FLAG=on"));
    println!("log line captured: {}", logged.contains("cat -b"));
    Ok(())
}
